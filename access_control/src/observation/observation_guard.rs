// access_control/src/observation/observation_guard.rs
use log::{debug, error, info, warn};
use uuid::Uuid;

use lib::storage_engine::ObservationStore;
use models::errors::{AccessError, AccessResult};
use models::medical::{AccessType, AuditAction, EditAccessInfo, MedicationStatus, ObservationRecord};
use models::{ActorContext, Role};

use crate::audit::AuditEvent;
use crate::context::EngineContext;
use crate::observation::edit_guard::{check_edit_access, EditWindowPolicy};

/// Applies the edit-window rule to stored observations and records edits.
#[derive(Clone)]
pub struct ObservationEditGuard {
    ctx: EngineContext,
    policy: EditWindowPolicy,
}

impl ObservationEditGuard {
    pub fn new(ctx: EngineContext) -> Self {
        let policy = EditWindowPolicy::from_config(&ctx.config);
        ObservationEditGuard { ctx, policy }
    }

    pub fn policy(&self) -> &EditWindowPolicy {
        &self.policy
    }

    pub async fn register_observation(&self, record: ObservationRecord) -> AccessResult<()> {
        debug!("Registering observation {} for patient {}", record.id, record.patient_id);
        self.ctx.storage.put_observation(record).await
    }

    pub async fn edit_info(&self, observation_id: &Uuid, clinician_id: Option<&str>) -> AccessResult<EditAccessInfo> {
        let record = self.load(observation_id).await?;
        Ok(check_edit_access(&record, self.ctx.clock.now(), &self.policy, clinician_id))
    }

    /// Permits the edit and records the clinician on the allow-list.
    /// Denials leave the record untouched.
    pub async fn authorize_edit(&self, actor: &ActorContext, observation_id: &Uuid) -> AccessResult<ObservationRecord> {
        actor.require_role(Role::Doctor, "edit observations")?;
        let record = self.load(observation_id).await?;
        let now = self.ctx.clock.now();
        let info = check_edit_access(&record, now, &self.policy, Some(&actor.actor_id));
        if info.can_edit != Some(true) {
            warn!("Edit of observation {} by {} denied: {}", observation_id, actor.actor_id, info.reason);
            return Err(AccessError::Forbidden(info.reason));
        }

        let updated = self
            .ctx
            .storage
            .record_observation_edit(observation_id, &actor.actor_id, now)
            .await?
            .ok_or_else(|| not_found(observation_id))?;

        let event = AuditEvent::new(
            actor,
            &updated.patient_id,
            AccessType::Regular,
            AuditAction::Update,
            format!("Observation {} edited ({:?} window)", observation_id, info.window),
        );
        if let Err(e) = self.ctx.audit.record(event).await {
            // Unaudited edits must not widen the allow-list.
            if let Err(restore) = self.ctx.storage.put_observation(record).await {
                error!("Failed to restore observation {} after failed audit write: {}", observation_id, restore);
            }
            return Err(e);
        }
        info!("Observation {} edited by {}", observation_id, actor.actor_id);
        Ok(updated)
    }

    /// Persists the derived medication status when it moved.
    pub async fn refresh_medication_status(&self, observation_id: &Uuid) -> AccessResult<Option<MedicationStatus>> {
        let record = self.load(observation_id).await?;
        let derived = self.policy.medication_status_at(&record, self.ctx.clock.now());
        match derived {
            Some(status) if record.medication_status != Some(status) => {
                self.ctx
                    .storage
                    .set_medication_status(observation_id, status)
                    .await?
                    .ok_or_else(|| not_found(observation_id))?;
                info!("Medication {} status changed to {:?}", observation_id, status);
            }
            _ => {}
        }
        Ok(derived)
    }

    async fn load(&self, observation_id: &Uuid) -> AccessResult<ObservationRecord> {
        self.ctx
            .storage
            .get_observation(observation_id)
            .await?
            .ok_or_else(|| not_found(observation_id))
    }
}

fn not_found(observation_id: &Uuid) -> AccessError {
    AccessError::NotFound(format!("Observation not found: {}", observation_id))
}
