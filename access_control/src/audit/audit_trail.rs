// access_control/src/audit/audit_trail.rs
use std::sync::Arc;
use log::{error, info};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use lib::clock::Clock;
use lib::storage_engine::{AccessStorageEngine, AuditLogStore};
use models::errors::AccessResult;
use models::medical::{AccessType, AuditAction, AuditFilter, AuditLogEntry};
use models::ActorContext;

/// What an engine wants recorded; the trail stamps id, time and origin.
#[derive(Debug, Clone)]
pub struct AuditEvent<'a> {
    pub actor: &'a ActorContext,
    pub patient_id: &'a str,
    pub access_type: AccessType,
    pub action: AuditAction,
    pub details: String,
    pub otp_verified: bool,
}

impl<'a> AuditEvent<'a> {
    pub fn new(
        actor: &'a ActorContext,
        patient_id: &'a str,
        access_type: AccessType,
        action: AuditAction,
        details: impl Into<String>,
    ) -> Self {
        AuditEvent {
            actor,
            patient_id,
            access_type,
            action,
            details: details.into(),
            otp_verified: false,
        }
    }

    pub fn otp_verified(mut self) -> Self {
        self.otp_verified = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPage {
    pub entries: Vec<AuditLogEntry>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Append-only log of access decisions. Writes are awaited by the caller so
/// the entry lands before the decision is reported.
#[derive(Clone)]
pub struct AuditTrail {
    storage: Arc<dyn AccessStorageEngine>,
    clock: Arc<dyn Clock>,
}

impl AuditTrail {
    pub fn new(storage: Arc<dyn AccessStorageEngine>, clock: Arc<dyn Clock>) -> Self {
        AuditTrail { storage, clock }
    }

    pub async fn record(&self, event: AuditEvent<'_>) -> AccessResult<AuditLogEntry> {
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            actor_id: event.actor.actor_id.clone(),
            patient_id: event.patient_id.to_string(),
            access_type: event.access_type,
            action: event.action,
            details: event.details,
            access_time: self.clock.now(),
            ip_address: event.actor.ip_address.clone(),
            user_agent: event.actor.user_agent.clone(),
            otp_verified: event.otp_verified,
        };
        if let Err(e) = self.storage.append_audit_entry(entry.clone()).await {
            error!(
                "Failed to write audit entry ({} {}) for patient {} by {}: {}",
                entry.action, entry.access_type, entry.patient_id, entry.actor_id, e
            );
            return Err(e);
        }
        info!(
            "Audit log created: {} {} access for patient {} by user {}",
            entry.action, entry.access_type, entry.patient_id, entry.actor_id
        );
        Ok(entry)
    }

    /// Newest first.
    pub async fn for_patient(&self, patient_id: &str, limit: usize, offset: usize) -> AccessResult<AuditPage> {
        let filter = AuditFilter {
            limit,
            offset,
            ..AuditFilter::for_patient(patient_id)
        };
        self.query(&filter).await
    }

    pub async fn query(&self, filter: &AuditFilter) -> AccessResult<AuditPage> {
        let entries = self.storage.find_audit_entries(filter).await?;
        let total = self.storage.count_audit_entries(filter).await?;
        Ok(AuditPage {
            entries,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }
}
