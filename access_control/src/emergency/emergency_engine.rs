// access_control/src/emergency/emergency_engine.rs
//! Break-glass access. No approval step; instead every grant and every read
//! made under it is audited and the patient is told straight away.
use std::collections::BTreeSet;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Serialize, Deserialize};
use serde_json::json;
use uuid::Uuid;

use lib::config::{JUSTIFICATION_MAX_CHARS, JUSTIFICATION_MIN_CHARS};
use lib::storage_engine::{AuditLogStore, EmergencyOverrideStore, PassportStore};
use models::errors::{AccessError, AccessResult};
use models::medical::{
    AccessType, AuditAction, AuditFilter, AuditLogEntry, EmailEnvelope, EmergencyOverride, EmergencyOverrideFilter,
    Hospital, NotificationType, PassportAccessRecord, PassportAccessType, Priority, UserProfile,
};
use models::{ActorContext, Role};

use crate::audit::AuditEvent;
use crate::context::{validate_text, EngineContext};
use crate::notification::OutboundNotification;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyGrant {
    #[serde(rename = "override")]
    pub override_record: EmergencyOverride,
    pub valid_until: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverridePage {
    pub overrides: Vec<EmergencyOverride>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencySummary {
    pub total_overrides: usize,
    pub total_audit_entries: usize,
    pub distinct_doctors: usize,
    pub last_access: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientEmergencyAudit {
    pub patient_id: String,
    pub overrides: Vec<EmergencyOverride>,
    pub audit_entries: Vec<AuditLogEntry>,
    pub summary: EmergencySummary,
}

#[derive(Clone)]
pub struct EmergencyOverrideEngine {
    ctx: EngineContext,
}

impl EmergencyOverrideEngine {
    pub fn new(ctx: EngineContext) -> Self {
        EmergencyOverrideEngine { ctx }
    }

    pub async fn grant(
        &self,
        actor: &ActorContext,
        patient_id: &str,
        justification: &str,
        hospital_id: Option<&str>,
    ) -> AccessResult<EmergencyGrant> {
        actor.require_role(Role::Doctor, "request emergency access")?;
        let justification = validate_text("justification", justification, JUSTIFICATION_MIN_CHARS, JUSTIFICATION_MAX_CHARS)?;
        let patient = self.ctx.directory.require_user(patient_id, Role::Patient).await?;
        let doctor = self.ctx.directory.require_user(&actor.actor_id, Role::Doctor).await?;
        let hospital = self.resolve_hospital(&doctor, hospital_id).await?;

        let now = self.ctx.clock.now();
        let record = EmergencyOverride {
            id: Uuid::new_v4(),
            doctor_user_id: doctor.id.clone(),
            patient_id: patient.id.clone(),
            hospital_id: hospital.as_ref().map(|h| h.id.clone()).or_else(|| doctor.hospital_id.clone()),
            justification,
            access_time: now,
            ip_address: actor.ip_address.clone(),
            user_agent: actor.user_agent.clone(),
        };
        // Audit first: an override row without its entry would be readable
        // through is_valid_for_read.
        let hospital_label = hospital.as_ref().map_or("Unknown", |h| h.name.as_str());
        self.ctx
            .audit
            .record(AuditEvent::new(
                actor,
                &patient.id,
                AccessType::Emergency,
                AuditAction::View,
                format!(
                    "Emergency break-glass access requested. Reason: {}. Hospital: {}",
                    record.justification, hospital_label
                ),
            ))
            .await?;
        if let Err(e) = self.ctx.storage.insert_emergency_override(record.clone()).await {
            error!(
                "Emergency access for doctor {} on patient {} audited but not stored: {}",
                doctor.id, patient.id, e
            );
            return Err(e);
        }
        warn!(
            "EMERGENCY ACCESS granted to doctor {} for patient {} (override {})",
            doctor.id, patient.id, record.id
        );

        let passport_entry = PassportAccessRecord {
            doctor_id: doctor.id.clone(),
            access_date: now,
            access_type: PassportAccessType::Emergency,
            reason: format!("EMERGENCY ACCESS: {}", record.justification),
            otp_verified: false,
        };
        if let Err(e) = self.ctx.storage.append_passport_access(&patient.id, passport_entry).await {
            error!("Failed to record emergency access in passport of {}: {}", patient.id, e);
        }

        self.notify_patient(&record, &patient, &doctor, hospital_label);
        if let Some(hospital) = &hospital {
            self.notify_hospital_admin(&record, &patient, &doctor, hospital).await;
        }

        let valid_until = record.valid_until(self.ctx.config.emergency_validity());
        Ok(EmergencyGrant {
            message: format!(
                "Emergency access granted until {}. This access is logged and audited.",
                valid_until.to_rfc3339()
            ),
            override_record: record,
            valid_until,
        })
    }

    async fn resolve_hospital(&self, doctor: &UserProfile, explicit: Option<&str>) -> AccessResult<Option<Hospital>> {
        match explicit.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self.ctx.directory.require_hospital(id).await.map(Some),
            None => match &doctor.hospital_id {
                Some(id) => self.ctx.directory.find_hospital(id).await,
                None => Ok(None),
            },
        }
    }

    /// True while the pair's latest override is inside the validity window.
    pub async fn is_valid_for_read(&self, doctor_user_id: &str, patient_id: &str) -> AccessResult<bool> {
        Ok(self.valid_override(doctor_user_id, patient_id).await?.is_some())
    }

    async fn valid_override(&self, doctor_user_id: &str, patient_id: &str) -> AccessResult<Option<EmergencyOverride>> {
        let now = self.ctx.clock.now();
        let window = self.ctx.config.emergency_validity();
        Ok(self
            .ctx
            .storage
            .latest_emergency_override(doctor_user_id, patient_id)
            .await?
            .filter(|o| o.is_valid_at(now, window)))
    }

    /// Gate for every read served under emergency access; audits the read.
    pub async fn record_emergency_read(
        &self,
        actor: &ActorContext,
        patient_id: &str,
        details: &str,
    ) -> AccessResult<AuditLogEntry> {
        let Some(record) = self.valid_override(&actor.actor_id, patient_id).await? else {
            warn!("Doctor {} attempted an emergency read of {} without a valid override", actor.actor_id, patient_id);
            return Err(AccessError::Forbidden(
                "No valid emergency access found. Please request emergency access first.".into(),
            ));
        };
        self.ctx
            .audit
            .record(AuditEvent::new(
                actor,
                patient_id,
                AccessType::Emergency,
                AuditAction::View,
                format!("Emergency read under override {}: {}", record.id, details),
            ))
            .await
    }

    /// Administrators only.
    pub async fn list_overrides(&self, actor: &ActorContext, filter: &EmergencyOverrideFilter) -> AccessResult<OverridePage> {
        actor.require_role(Role::Admin, "view emergency access records")?;
        self.page(filter).await
    }

    /// The patient themself or an administrator.
    pub async fn patient_emergency_audit(&self, actor: &ActorContext, patient_id: &str) -> AccessResult<PatientEmergencyAudit> {
        if actor.actor_id != patient_id && !actor.is_admin() {
            return Err(AccessError::Forbidden("Not authorized to view this patient's emergency audit".into()));
        }
        let overrides = self
            .ctx
            .storage
            .find_emergency_overrides(&EmergencyOverrideFilter::for_patient(patient_id))
            .await?;
        let audit_filter = AuditFilter {
            access_type: Some(AccessType::Emergency),
            ..AuditFilter::for_patient(patient_id).unbounded()
        };
        let audit_entries = self.ctx.storage.find_audit_entries(&audit_filter).await?;

        let summary = EmergencySummary {
            total_overrides: overrides.len(),
            total_audit_entries: audit_entries.len(),
            distinct_doctors: overrides
                .iter()
                .map(|o| o.doctor_user_id.as_str())
                .collect::<BTreeSet<_>>()
                .len(),
            last_access: overrides.iter().map(|o| o.access_time).max(),
        };
        Ok(PatientEmergencyAudit {
            patient_id: patient_id.to_string(),
            overrides,
            audit_entries,
            summary,
        })
    }

    /// The calling doctor's own overrides, newest first.
    pub async fn doctor_emergency_history(&self, actor: &ActorContext, limit: usize, offset: usize) -> AccessResult<OverridePage> {
        actor.require_role(Role::Doctor, "view emergency access history")?;
        let filter = EmergencyOverrideFilter {
            doctor_id: Some(actor.actor_id.clone()),
            limit,
            offset,
            ..Default::default()
        };
        self.page(&filter).await
    }

    async fn page(&self, filter: &EmergencyOverrideFilter) -> AccessResult<OverridePage> {
        let overrides = self.ctx.storage.find_emergency_overrides(filter).await?;
        let total = self.ctx.storage.count_emergency_overrides(filter).await?;
        Ok(OverridePage {
            overrides,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    fn notify_patient(&self, record: &EmergencyOverride, patient: &UserProfile, doctor: &UserProfile, hospital_label: &str) {
        let message = format!(
            "Dr. {} from {} accessed your medical records under emergency (break-glass) access. Reason: {}",
            doctor.name, hospital_label, record.justification
        );
        let notification = self.ctx.composer.compose(
            &patient.id,
            NotificationType::EmergencyAccess,
            Priority::Urgent,
            "Emergency Access to Your Records",
            message.clone(),
            json!({
                "overrideId": record.id,
                "doctorId": doctor.id,
                "doctorName": doctor.name,
                "hospitalName": hospital_label,
                "accessTime": record.access_time,
            }),
        );
        let email = EmailEnvelope {
            to: patient.email.clone(),
            subject: "URGENT: Emergency access to your medical records".into(),
            body: format!(
                "Dear {},\n\n{}\n\nAccess time: {}\n\nIf you did not expect this, contact the hospital immediately.",
                patient.name,
                message,
                record.access_time.to_rfc2822()
            ),
        };
        if let Some(warning) = self.ctx.notify(OutboundNotification { message: notification, email: Some(email) }) {
            warn!("Emergency notification for patient {} not queued: {}", patient.id, warning);
        }
    }

    async fn notify_hospital_admin(&self, record: &EmergencyOverride, patient: &UserProfile, doctor: &UserProfile, hospital: &Hospital) {
        let Some(admin_id) = &hospital.admin_user_id else {
            return;
        };
        let message = format!(
            "Dr. {} used emergency access for patient {} at {}. Reason: {}",
            doctor.name, patient.name, hospital.name, record.justification
        );
        let notification = self.ctx.composer.compose(
            admin_id,
            NotificationType::EmergencyAccess,
            Priority::Urgent,
            "Emergency Access Alert",
            message.clone(),
            json!({
                "overrideId": record.id,
                "doctorId": doctor.id,
                "patientId": patient.id,
                "hospitalId": hospital.id,
            }),
        );
        let email = match self.ctx.directory.find_user(admin_id).await {
            Ok(Some(admin)) => Some(EmailEnvelope {
                to: admin.email,
                subject: format!("Emergency access alert - {}", hospital.name),
                body: format!("{}\n\nOverride id: {}", message, record.id),
            }),
            Ok(None) => None,
            Err(e) => {
                warn!("Could not resolve hospital admin {}: {}", admin_id, e);
                None
            }
        };
        if let Some(warning) = self.ctx.notify(OutboundNotification { message: notification, email }) {
            warn!("Emergency alert for hospital {} not queued: {}", hospital.id, warning);
        } else {
            info!("Emergency alert queued for hospital admin {}", admin_id);
        }
    }
}
