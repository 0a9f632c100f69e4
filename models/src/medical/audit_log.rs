// models/src/medical/audit_log.rs
use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    Regular,
    Emergency,
    Consent,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessType::Regular => "regular",
            AccessType::Emergency => "emergency",
            AccessType::Consent => "consent",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    View,
    Create,
    Update,
    Delete,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditAction::View => "view",
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        })
    }
}

/// Append-only record of one access decision or data touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: String,
    pub patient_id: String,
    pub access_type: AccessType,
    pub action: AuditAction,
    pub details: String,
    pub access_time: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub otp_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilter {
    pub patient_id: Option<String>,
    pub actor_id: Option<String>,
    pub access_type: Option<AccessType>,
    pub action: Option<AuditAction>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for AuditFilter {
    fn default() -> Self {
        AuditFilter {
            patient_id: None,
            actor_id: None,
            access_type: None,
            action: None,
            since: None,
            until: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl AuditFilter {
    pub fn for_patient(patient_id: &str) -> Self {
        AuditFilter {
            patient_id: Some(patient_id.to_string()),
            ..Default::default()
        }
    }

    pub fn unbounded(mut self) -> Self {
        self.limit = usize::MAX;
        self.offset = 0;
        self
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.patient_id.as_deref().map_or(true, |p| p == entry.patient_id)
            && self.actor_id.as_deref().map_or(true, |a| a == entry.actor_id)
            && self.access_type.map_or(true, |t| t == entry.access_type)
            && self.action.map_or(true, |a| a == entry.action)
            && self.since.map_or(true, |s| entry.access_time >= s)
            && self.until.map_or(true, |u| entry.access_time <= u)
    }
}
