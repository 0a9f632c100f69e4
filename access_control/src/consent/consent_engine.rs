// access_control/src/consent/consent_engine.rs
//! Formal consent requests: a doctor asks, the patient approves or denies,
//! and the grant lapses at `expires_at`. Expiry is derived on every read and
//! written back before any state change.
use std::collections::BTreeSet;
use chrono::Duration;
use log::{error, info, warn};
use serde::{Serialize, Deserialize};
use serde_json::json;
use uuid::Uuid;

use lib::config::{REASON_MAX_CHARS, REASON_MIN_CHARS, RESPONSE_REASON_MAX_CHARS};
use lib::storage_engine::ConsentRequestStore;
use models::errors::{AccessError, AccessResult};
use models::medical::{
    AccessType, AuditAction, ConsentDecision, ConsentRequest, ConsentRequestFilter, ConsentStatus,
    DataCategory, EmailEnvelope, Hospital, NotificationType, Priority, RequestType, UserProfile,
};
use models::{ActorContext, Role};

use crate::audit::AuditEvent;
use crate::context::{validate_optional_text, validate_text, EngineContext};
use crate::notification::OutboundNotification;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConsentRequest {
    pub patient_id: String,
    pub hospital_id: String,
    pub request_type: RequestType,
    pub reason: String,
    pub requested_data: Vec<String>,
    pub expires_in_hours: Option<i64>,
}

#[derive(Clone)]
pub struct ConsentRequestEngine {
    ctx: EngineContext,
}

impl ConsentRequestEngine {
    pub fn new(ctx: EngineContext) -> Self {
        ConsentRequestEngine { ctx }
    }

    /// Opens a request from the calling doctor, or refreshes the live pending
    /// one for the same doctor and patient.
    pub async fn create(&self, actor: &ActorContext, input: NewConsentRequest) -> AccessResult<ConsentRequest> {
        actor.require_role(Role::Doctor, "create access requests")?;
        let reason = validate_text("reason", &input.reason, REASON_MIN_CHARS, REASON_MAX_CHARS)?;
        let requested_data = parse_requested_data(&input.requested_data)?;
        let hours = self.expiry_hours(input.request_type, input.expires_in_hours)?;

        let patient = self.ctx.directory.require_user(&input.patient_id, Role::Patient).await?;
        let doctor = self.ctx.directory.require_user(&actor.actor_id, Role::Doctor).await?;
        let hospital = self.ctx.directory.require_hospital(&input.hospital_id).await?;

        let now = self.ctx.clock.now();
        let expires_at = now + Duration::hours(hours);

        let mut filter = ConsentRequestFilter::for_pair(&doctor.id, &patient.id);
        filter.status = Some(ConsentStatus::Pending);
        let live_pending = self
            .ctx
            .storage
            .find_consent_requests(&filter)
            .await?
            .into_iter()
            .find(|r| !r.is_expired(now));

        let refreshed = match live_pending {
            Some(mut existing) => {
                let previous = existing.clone();
                existing.hospital_id = hospital.id.clone();
                existing.request_type = input.request_type;
                existing.reason = reason.clone();
                existing.requested_data = requested_data.clone();
                existing.expires_at = expires_at;
                existing.updated_at = now;
                if self.ctx.storage.update_consent_request_if_pending(existing.clone()).await? {
                    Some((existing, previous))
                } else {
                    None
                }
            }
            None => None,
        };

        let (request, action, previous) = match refreshed {
            Some((request, previous)) => {
                info!("Updated existing pending access request {}", request.id);
                (request, AuditAction::Update, Some(previous))
            }
            None => {
                let request = ConsentRequest {
                    id: Uuid::new_v4(),
                    patient_id: patient.id.clone(),
                    doctor_id: doctor.id.clone(),
                    hospital_id: hospital.id.clone(),
                    request_type: input.request_type,
                    reason,
                    requested_data,
                    status: ConsentStatus::Pending,
                    expires_at,
                    approved_at: None,
                    denied_at: None,
                    patient_response: None,
                    patient_response_at: None,
                    patient_response_reason: None,
                    created_at: now,
                    updated_at: now,
                };
                self.ctx.storage.insert_consent_request(request.clone()).await?;
                info!(
                    "Access request {} created by doctor {} for patient {} ({:?}, expires {})",
                    request.id, doctor.id, patient.id, request.request_type, request.expires_at
                );
                (request, AuditAction::Create, None)
            }
        };

        let event = AuditEvent::new(
            actor,
            &request.patient_id,
            AccessType::Consent,
            action,
            format!(
                "Access request {} ({}) for {}. Reason: {}",
                request.id,
                request.request_type.label(),
                request.requested_data_labels(),
                request.reason
            ),
        );
        self.audited(event, &request.id, previous).await?;

        self.notify_patient_of_request(&request, &patient, &doctor, &hospital, action == AuditAction::Update);
        Ok(request)
    }

    /// Patient's answer. Expiry is written back and reported as `Expired`.
    pub async fn respond(
        &self,
        actor: &ActorContext,
        request_id: &Uuid,
        decision: ConsentDecision,
        reason: Option<&str>,
    ) -> AccessResult<ConsentRequest> {
        actor.require_role(Role::Patient, "respond to access requests")?;
        let reason = validate_optional_text("response reason", reason, RESPONSE_REASON_MAX_CHARS)?;

        let mut request = self
            .ctx
            .storage
            .get_consent_request(request_id)
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("Access request not found: {}", request_id)))?;

        if request.patient_id != actor.actor_id {
            warn!("Patient {} tried to answer access request {} of another patient", actor.actor_id, request_id);
            return Err(AccessError::Forbidden("Not authorized to respond to this access request".into()));
        }

        let now = self.ctx.clock.now();
        if request.is_expired(now) {
            let previous = request.clone();
            if request.normalize(now) {
                self.ctx.storage.update_consent_request(request.clone()).await?;
                let details = match previous.status {
                    ConsentStatus::Pending => {
                        format!("Access request {} expired before the patient responded", request.id)
                    }
                    earlier => format!(
                        "Access request {} expired after being {}; late response not applied",
                        request.id, earlier
                    ),
                };
                let event = AuditEvent::new(actor, &request.patient_id, AccessType::Consent, AuditAction::Update, details);
                self.audited(event, &request.id, Some(previous)).await?;
                info!("Access request {} marked expired", request.id);
            }
            return Err(AccessError::Expired("Access request has expired".into()));
        }

        let previous = request.clone();
        request.record_decision(decision, reason, now)?;
        if !self.ctx.storage.update_consent_request_if_pending(request.clone()).await? {
            return Err(AccessError::InvalidState(format!(
                "Access request {} has already been processed",
                request.id
            )));
        }

        let event = AuditEvent::new(
            actor,
            &request.patient_id,
            AccessType::Consent,
            AuditAction::Update,
            format!("Access request {} {} by patient", request.id, request.status),
        );
        self.audited(event, &request.id, Some(previous)).await?;
        info!("Access request {} {} by patient {}", request.id, request.status, actor.actor_id);

        self.notify_doctor_of_response(&request).await;
        Ok(request)
    }

    /// Writes the audit entry for a consent write that already landed. On
    /// failure the write is undone: `previous` is restored, or the new
    /// request removed when there was none.
    async fn audited(
        &self,
        event: AuditEvent<'_>,
        request_id: &Uuid,
        previous: Option<ConsentRequest>,
    ) -> AccessResult<()> {
        let Err(e) = self.ctx.audit.record(event).await else {
            return Ok(());
        };
        let undone = match previous {
            Some(previous) => self.ctx.storage.update_consent_request(previous).await,
            None => self.ctx.storage.delete_consent_request(request_id).await,
        };
        match undone {
            Ok(()) => warn!("Access request {} rolled back after failed audit write", request_id),
            Err(undo) => error!("Failed to roll back access request {}: {}", request_id, undo),
        }
        Err(e)
    }

    /// Read-side gate: an approved, unexpired request exists for the pair.
    pub async fn check_access(&self, doctor_id: &str, patient_id: &str) -> AccessResult<bool> {
        Ok(self.active_grant(doctor_id, patient_id).await?.is_some())
    }

    /// Most recently approved request still in force for the pair.
    pub async fn active_grant(&self, doctor_id: &str, patient_id: &str) -> AccessResult<Option<ConsentRequest>> {
        let now = self.ctx.clock.now();
        let mut filter = ConsentRequestFilter::for_pair(doctor_id, patient_id);
        filter.status = Some(ConsentStatus::Approved);
        Ok(self
            .ctx
            .storage
            .find_consent_requests(&filter)
            .await?
            .into_iter()
            .filter(|r| r.grants_access(now))
            .max_by_key(|r| r.approved_at))
    }

    pub async fn pending_for_patient(&self, patient_id: &str) -> AccessResult<Vec<ConsentRequest>> {
        let now = self.ctx.clock.now();
        let filter = ConsentRequestFilter {
            patient_id: Some(patient_id.to_string()),
            status: Some(ConsentStatus::Pending),
            ..Default::default()
        };
        Ok(self
            .ctx
            .storage
            .find_consent_requests(&filter)
            .await?
            .into_iter()
            .map(|r| r.observed(now))
            .filter(|r| r.status == ConsentStatus::Pending)
            .collect())
    }

    pub async fn by_doctor(&self, doctor_id: &str) -> AccessResult<Vec<ConsentRequest>> {
        let now = self.ctx.clock.now();
        let filter = ConsentRequestFilter {
            doctor_id: Some(doctor_id.to_string()),
            ..Default::default()
        };
        Ok(self
            .ctx
            .storage
            .find_consent_requests(&filter)
            .await?
            .into_iter()
            .map(|r| r.observed(now))
            .collect())
    }

    /// Visible only to the request's own patient and doctor.
    pub async fn get_request(&self, actor: &ActorContext, request_id: &Uuid) -> AccessResult<ConsentRequest> {
        let now = self.ctx.clock.now();
        match self.ctx.storage.get_consent_request(request_id).await? {
            Some(request) if request.involves(&actor.actor_id) => Ok(request.observed(now)),
            _ => Err(AccessError::NotFound(format!("Access request not found: {}", request_id))),
        }
    }

    fn expiry_hours(&self, request_type: RequestType, requested: Option<i64>) -> AccessResult<i64> {
        let config = &self.ctx.config;
        match requested {
            Some(hours) if hours <= 0 || hours > config.consent_max_hours => Err(AccessError::Validation(format!(
                "expiresInHours must be between 1 and {} (got {})",
                config.consent_max_hours, hours
            ))),
            Some(hours) => Ok(hours),
            None if request_type == RequestType::Emergency => Ok(config.consent_emergency_hours),
            None => Ok(config.consent_default_hours),
        }
    }

    fn notify_patient_of_request(
        &self,
        request: &ConsentRequest,
        patient: &UserProfile,
        doctor: &UserProfile,
        hospital: &Hospital,
        refreshed: bool,
    ) {
        let priority = if request.request_type == RequestType::Emergency {
            Priority::Urgent
        } else {
            Priority::High
        };
        let (title, verb) = if refreshed {
            ("Updated Access Request", "has updated their access request to")
        } else {
            ("New Access Request", "is requesting access to")
        };
        let message = format!("Dr. {} from {} {} your medical records.", doctor.name, hospital.name, verb);
        let notification = self.ctx.composer.compose(
            &patient.id,
            NotificationType::AccessRequest,
            priority,
            title,
            message.clone(),
            json!({
                "requestId": request.id,
                "doctorName": doctor.name,
                "hospitalName": hospital.name,
                "requestType": request.request_type,
                "reason": request.reason,
            }),
        );
        let body = format!(
            "Dear {},\n\n{}\n\nType: {}\nReason: {}\nRequested data: {}\nExpires: {}\n\nPlease review the request as soon as possible.",
            patient.name,
            message,
            request.request_type.label(),
            request.reason,
            request.requested_data_labels(),
            request.expires_at.to_rfc2822(),
        );
        let email = EmailEnvelope {
            to: patient.email.clone(),
            subject: "Access Request - Patient Passport".into(),
            body,
        };
        if let Some(warning) = self.ctx.notify(OutboundNotification { message: notification, email: Some(email) }) {
            warn!("Access request {} notification not queued: {}", request.id, warning);
        }
    }

    async fn notify_doctor_of_response(&self, request: &ConsentRequest) {
        let approved = request.status == ConsentStatus::Approved;
        let (notification_type, word) = if approved {
            (NotificationType::AccessApproved, "Approved")
        } else {
            (NotificationType::AccessDenied, "Denied")
        };
        let message = format!(
            "Your access request for {} has been {}.",
            request.patient_id, request.status
        );
        let notification = self.ctx.composer.compose(
            &request.doctor_id,
            notification_type,
            Priority::Medium,
            format!("Access Request {}", word),
            message.clone(),
            json!({
                "requestId": request.id,
                "patientId": request.patient_id,
                "status": request.status,
                "reason": request.patient_response_reason,
            }),
        );
        let email = match self.ctx.directory.find_user(&request.doctor_id).await {
            Ok(Some(doctor)) => Some(EmailEnvelope {
                to: doctor.email,
                subject: format!("Access Request {} - Patient Passport", word),
                body: match &request.patient_response_reason {
                    Some(reason) => format!("Dear Dr. {},\n\n{}\n\nReason: {}", doctor.name, message, reason),
                    None => format!("Dear Dr. {},\n\n{}", doctor.name, message),
                },
            }),
            Ok(None) => None,
            Err(e) => {
                warn!("Could not resolve doctor {} for response email: {}", request.doctor_id, e);
                None
            }
        };
        if let Some(warning) = self.ctx.notify(OutboundNotification { message: notification, email }) {
            warn!("Response notification for request {} not queued: {}", request.id, warning);
        }
    }
}

fn parse_requested_data(values: &[String]) -> AccessResult<BTreeSet<DataCategory>> {
    if values.is_empty() {
        return Err(AccessError::Validation("requestedData must name at least one data category".into()));
    }
    values.iter().map(|v| v.parse::<DataCategory>()).collect()
}
