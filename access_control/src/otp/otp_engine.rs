// access_control/src/otp/otp_engine.rs
//! Doctor-bound one-time codes the patient reads out loud.
//!
//! Every mutation of a patient's code slot is an optimistic
//! read / compute / compare-and-swap round; a lost race re-reads the slot.
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rand::Rng;
use serde::{Serialize, Deserialize};
use serde_json::json;

use lib::storage_engine::{OneTimeCodeStore, PassportStore};
use models::errors::{AccessError, AccessResult};
use models::medical::{
    AccessType, AuditAction, CodeSlot, EmailEnvelope, NotificationType, OneTimeCode, PassportAccessRecord,
    PassportAccessType, Priority, UserProfile,
};
use models::{ActorContext, Role};

use crate::audit::AuditEvent;
use crate::context::EngineContext;
use crate::notification::OutboundNotification;

const MAX_CAS_RETRIES: usize = 8;
const MIN_CODE_DIGITS: u32 = 4;
const MAX_CODE_DIGITS: u32 = 9;

/// Metadata about the code a doctor asked for. The digits themselves travel
/// to the patient only, unless the deployment opts into exposing them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeIssuance {
    pub patient_id: String,
    pub doctor_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// True when an outstanding live code was returned instead of a new one.
    pub reused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Returned on successful verification. The grant duration is advisory;
/// endpoints serving data enforce their own checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessAssertion {
    pub token: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub grant_duration_secs: i64,
    pub instruction: String,
}

enum SlotOutcome<T> {
    Done(T),
    Retry,
}

/// A slot change that has landed and still needs its audit entry.
struct SlotChange<T> {
    value: T,
    previous: Option<CodeSlot>,
    written: Option<CodeSlot>,
}

#[derive(Clone)]
pub struct OneTimeCodeEngine {
    ctx: EngineContext,
}

impl OneTimeCodeEngine {
    pub fn new(ctx: EngineContext) -> Self {
        OneTimeCodeEngine { ctx }
    }

    pub async fn request_code(&self, actor: &ActorContext, patient_id: &str) -> AccessResult<CodeIssuance> {
        actor.require_role(Role::Doctor, "request access codes")?;
        let patient = self.ctx.directory.require_user(patient_id, Role::Patient).await?;
        let doctor = self.ctx.directory.require_user(&actor.actor_id, Role::Doctor).await?;

        for attempt in 0..MAX_CAS_RETRIES {
            match self.try_issue(&patient.id, &doctor.id).await? {
                SlotOutcome::Done(Issued::Reused(code)) => {
                    debug!("Reusing live code for doctor {} and patient {}", doctor.id, patient.id);
                    return Ok(self.issuance(&code, &patient.id, true, None));
                }
                SlotOutcome::Done(Issued::Minted(change)) => {
                    return self.announce_new_code(actor, &patient, &doctor, change).await;
                }
                SlotOutcome::Retry => debug!("Code slot for {} changed concurrently (attempt {})", patient.id, attempt + 1),
            }
        }
        Err(contention(&patient.id))
    }

    async fn try_issue(&self, patient_id: &str, doctor_id: &str) -> AccessResult<SlotOutcome<Issued>> {
        let now = self.ctx.clock.now();
        let current = self.ctx.storage.get_code_slot(patient_id).await?;
        let mut slot = current.clone().unwrap_or_else(|| CodeSlot::new(patient_id));
        slot.prune_expired(now);

        if let Some(existing) = slot.live_code_for(doctor_id, now) {
            return Ok(SlotOutcome::Done(Issued::Reused(existing.clone())));
        }
        if !self.ctx.config.allow_concurrent_codes && !slot.is_empty() {
            info!("Replacing {} outstanding code(s) for patient {}", slot.codes.len(), patient_id);
            slot.codes.clear();
        }

        let code = OneTimeCode {
            code: self.generate_code(&slot),
            bound_doctor_id: doctor_id.to_string(),
            issued_at: now,
            expires_at: now + self.ctx.config.otp_ttl(),
        };
        slot.codes.push(code.clone());
        slot.reset_attempts(doctor_id);

        let written = slot.into_persisted();
        let swapped = self
            .ctx
            .storage
            .compare_and_swap_code_slot(patient_id, current.as_ref(), written.clone())
            .await?;
        if !swapped {
            return Ok(SlotOutcome::Retry);
        }
        Ok(SlotOutcome::Done(Issued::Minted(SlotChange { value: code, previous: current, written })))
    }

    async fn announce_new_code(
        &self,
        actor: &ActorContext,
        patient: &UserProfile,
        doctor: &UserProfile,
        change: SlotChange<OneTimeCode>,
    ) -> AccessResult<CodeIssuance> {
        let event = AuditEvent::new(
            actor,
            &patient.id,
            AccessType::Consent,
            AuditAction::Create,
            format!("OTP issued to Dr. {} ({}), expires {}", doctor.name, doctor.id, change.value.expires_at),
        );
        let code = self.audited(&patient.id, event, change).await?;
        info!("OTP issued for patient {} to doctor {}", patient.id, doctor.id);

        let minutes = self.ctx.config.otp_ttl().num_minutes();
        let message = format!(
            "Dr. {} is requesting access to your records. Your access code is {}. It expires in {} minutes.",
            doctor.name, code.code, minutes
        );
        let notification = self.ctx.composer.compose(
            &patient.id,
            NotificationType::OtpIssued,
            Priority::High,
            "Access Code Requested",
            message,
            json!({
                "doctorId": doctor.id,
                "doctorName": doctor.name,
                "expiresAt": code.expires_at,
            }),
        );
        let email = EmailEnvelope {
            to: patient.email.clone(),
            subject: "Your Patient Passport access code".into(),
            body: format!(
                "Dear {},\n\nDr. {} has requested access to your medical passport.\n\nAccess code: {}\n\nThis code expires in {} minutes. Only read it out to the doctor who is with you.",
                patient.name, doctor.name, code.code, minutes
            ),
        };
        let email_warning = self.ctx.notify(OutboundNotification { message: notification, email: Some(email) });
        if let Some(reason) = &email_warning {
            warn!(
                "OTP email for patient {} not queued ({}). Code for doctor {}: {}",
                patient.id, reason, doctor.id, code.code
            );
        }
        Ok(self.issuance(&code, &patient.id, false, email_warning))
    }

    /// Checks run in order: no code, wrong digits, expired, wrong doctor.
    pub async fn verify_code(
        &self,
        actor: &ActorContext,
        patient_id: &str,
        submitted_code: &str,
    ) -> AccessResult<AccessAssertion> {
        actor.require_role(Role::Doctor, "verify access codes")?;
        let submitted = submitted_code.trim();

        let mut verified = None;
        for attempt in 0..MAX_CAS_RETRIES {
            match self.try_consume(actor, patient_id, submitted).await? {
                SlotOutcome::Done(change) => {
                    verified = Some(change);
                    break;
                }
                SlotOutcome::Retry => debug!("Code slot for {} changed concurrently (attempt {})", patient_id, attempt + 1),
            }
        }
        let change = verified.ok_or_else(|| contention(patient_id))?;
        let event = AuditEvent::new(
            actor,
            patient_id,
            AccessType::Consent,
            AuditAction::View,
            format!("OTP verified; code issued at {} consumed", change.value.issued_at),
        )
        .otp_verified();
        self.audited(patient_id, event, change).await?;
        info!("OTP verified for patient {} by doctor {}", patient_id, actor.actor_id);

        let now = self.ctx.clock.now();
        let record = PassportAccessRecord {
            doctor_id: actor.actor_id.clone(),
            access_date: now,
            access_type: PassportAccessType::Otp,
            reason: "OTP verified access".into(),
            otp_verified: true,
        };
        if let Err(e) = self.ctx.storage.append_passport_access(patient_id, record).await {
            error!("Failed to record OTP access in passport of {}: {}", patient_id, e);
        }

        let grant = self.ctx.config.otp_grant();
        Ok(AccessAssertion {
            token: access_token(),
            patient_id: patient_id.to_string(),
            doctor_id: actor.actor_id.clone(),
            issued_at: now,
            expires_at: now + grant,
            grant_duration_secs: grant.num_seconds(),
            instruction: format!(
                "Fetch the passport by patientId {}, not by doctorId. Re-verify after {} minutes.",
                patient_id,
                grant.num_minutes()
            ),
        })
    }

    async fn try_consume(
        &self,
        actor: &ActorContext,
        patient_id: &str,
        submitted: &str,
    ) -> AccessResult<SlotOutcome<SlotChange<OneTimeCode>>> {
        let now = self.ctx.clock.now();
        let current = match self.ctx.storage.get_code_slot(patient_id).await? {
            Some(slot) if !slot.is_empty() => slot,
            _ => {
                return Err(AccessError::NotFound(
                    "No OTP found for this patient. Please request a new code.".into(),
                ))
            }
        };
        let mut slot = current.clone();

        let Some(matched) = slot.find_code(submitted).cloned() else {
            return self.register_mismatch(actor, patient_id, current, slot).await;
        };

        if matched.is_expired(now) {
            slot.remove_code(&matched.code);
            slot.prune_expired(now);
            let Some(change) = self.swap(patient_id, current, slot, ()).await? else {
                return Ok(SlotOutcome::Retry);
            };
            let event = AuditEvent::new(
                actor,
                patient_id,
                AccessType::Consent,
                AuditAction::Update,
                format!("Expired OTP cleared (expired at {})", matched.expires_at),
            );
            self.audited(patient_id, event, change).await?;
            info!("Expired OTP for patient {} cleared", patient_id);
            return Err(AccessError::Expired("OTP has expired. Please request a new code.".into()));
        }

        if !matched.is_bound_to(&actor.actor_id) {
            warn!(
                "Doctor {} presented a code bound to doctor {} for patient {}",
                actor.actor_id, matched.bound_doctor_id, patient_id
            );
            return Err(AccessError::Forbidden("This OTP was issued to a different doctor".into()));
        }

        slot.remove_code(&matched.code);
        slot.reset_attempts(&actor.actor_id);
        Ok(match self.swap(patient_id, current, slot, matched).await? {
            Some(change) => SlotOutcome::Done(change),
            None => SlotOutcome::Retry,
        })
    }

    /// Counts against the submitting doctor only; at the cap that doctor's
    /// codes go, codes bound to other doctors stay.
    async fn register_mismatch(
        &self,
        actor: &ActorContext,
        patient_id: &str,
        current: CodeSlot,
        mut slot: CodeSlot,
    ) -> AccessResult<SlotOutcome<SlotChange<OneTimeCode>>> {
        let doctor_id = actor.actor_id.as_str();
        let max = self.ctx.config.otp_max_attempts;
        let attempts = slot.record_failed_attempt(doctor_id);
        let exhausted = attempts >= max;
        if exhausted {
            slot.remove_codes_for(doctor_id);
            slot.reset_attempts(doctor_id);
        }
        let Some(change) = self.swap(patient_id, current, slot, ()).await? else {
            return Ok(SlotOutcome::Retry);
        };

        let details = if exhausted {
            format!(
                "Invalid OTP submitted by {} ({} of {} attempts); their outstanding codes cleared",
                doctor_id, attempts, max
            )
        } else {
            format!("Invalid OTP submitted by {} ({} of {} attempts)", doctor_id, attempts, max)
        };
        let event = AuditEvent::new(actor, patient_id, AccessType::Consent, AuditAction::View, details);
        self.audited(patient_id, event, change).await?;

        if exhausted {
            warn!("Too many invalid OTP attempts by doctor {} for patient {}, their codes cleared", doctor_id, patient_id);
            return Err(AccessError::TooManyAttempts(
                "Too many invalid attempts. Please request a new code.".into(),
            ));
        }
        Err(AccessError::InvalidCode("Invalid OTP".into()))
    }

    /// Clears every outstanding code for the patient. Returns how many went.
    pub async fn invalidate_codes(&self, actor: &ActorContext, patient_id: &str) -> AccessResult<usize> {
        if actor.actor_id != patient_id && !actor.is_admin() {
            return Err(AccessError::Forbidden("Only the patient or an administrator may revoke codes".into()));
        }
        for _ in 0..MAX_CAS_RETRIES {
            let Some(current) = self.ctx.storage.get_code_slot(patient_id).await? else {
                return Ok(0);
            };
            let cleared = current.codes.len();
            let Some(change) = self.swap(patient_id, current, CodeSlot::new(patient_id), ()).await? else {
                continue;
            };
            let event = AuditEvent::new(
                actor,
                patient_id,
                AccessType::Consent,
                AuditAction::Delete,
                format!("{} outstanding OTP(s) revoked", cleared),
            );
            self.audited(patient_id, event, change).await?;
            info!("Revoked {} code(s) for patient {} at the request of {}", cleared, patient_id, actor.actor_id);
            return Ok(cleared);
        }
        Err(contention(patient_id))
    }

    /// `None` when another writer changed the slot first.
    async fn swap<T>(
        &self,
        patient_id: &str,
        current: CodeSlot,
        next: CodeSlot,
        value: T,
    ) -> AccessResult<Option<SlotChange<T>>> {
        let written = next.into_persisted();
        let swapped = self
            .ctx
            .storage
            .compare_and_swap_code_slot(patient_id, Some(&current), written.clone())
            .await?;
        Ok(swapped.then(|| SlotChange { value, previous: Some(current), written }))
    }

    /// Writes the audit entry for a landed slot change. If the entry cannot be
    /// written the slot is put back, so no change survives unaudited.
    async fn audited<T>(&self, patient_id: &str, event: AuditEvent<'_>, change: SlotChange<T>) -> AccessResult<T> {
        if let Err(e) = self.ctx.audit.record(event).await {
            self.roll_back(patient_id, change.written, change.previous).await;
            return Err(e);
        }
        Ok(change.value)
    }

    async fn roll_back(&self, patient_id: &str, written: Option<CodeSlot>, previous: Option<CodeSlot>) {
        match self
            .ctx
            .storage
            .compare_and_swap_code_slot(patient_id, written.as_ref(), previous)
            .await
        {
            Ok(true) => warn!("Code slot for patient {} rolled back after failed audit write", patient_id),
            Ok(false) => error!("Code slot for patient {} changed before it could be rolled back", patient_id),
            Err(e) => error!("Failed to roll back code slot for patient {}: {}", patient_id, e),
        }
    }

    fn issuance(&self, code: &OneTimeCode, patient_id: &str, reused: bool, email_warning: Option<String>) -> CodeIssuance {
        CodeIssuance {
            patient_id: patient_id.to_string(),
            doctor_id: code.bound_doctor_id.clone(),
            issued_at: code.issued_at,
            expires_at: code.expires_at,
            reused,
            email_warning,
            code: self.ctx.config.expose_code_in_response.then(|| code.code.clone()),
        }
    }

    /// Zero-padded numeric code not already present in the slot.
    fn generate_code(&self, slot: &CodeSlot) -> String {
        let digits = self.ctx.config.otp_code_length.clamp(MIN_CODE_DIGITS, MAX_CODE_DIGITS);
        let upper = 10u64.pow(digits);
        let mut rng = rand::thread_rng();
        loop {
            let candidate = format!("{:0width$}", rng.gen_range(0..upper), width = digits as usize);
            if slot.find_code(&candidate).is_none() {
                return candidate;
            }
        }
    }
}

enum Issued {
    Reused(OneTimeCode),
    Minted(SlotChange<OneTimeCode>),
}

fn access_token() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn contention(patient_id: &str) -> AccessError {
    AccessError::InternalError(format!("Code slot for patient {} is under heavy contention, try again", patient_id))
}
