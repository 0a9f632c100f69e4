// models/src/medical/emergency_override.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

/// Write-once record of a break-glass access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyOverride {
    pub id: Uuid,
    pub doctor_user_id: String,
    pub patient_id: String,
    pub hospital_id: Option<String>,
    pub justification: String,
    pub access_time: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl EmergencyOverride {
    pub fn valid_until(&self, window: Duration) -> DateTime<Utc> {
        self.access_time + window
    }

    /// Derived validity: inside `window` of `access_time`.
    pub fn is_valid_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now >= self.access_time && now - self.access_time <= window
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyOverrideFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub doctor_id: Option<String>,
    pub patient_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for EmergencyOverrideFilter {
    fn default() -> Self {
        EmergencyOverrideFilter {
            since: None,
            until: None,
            doctor_id: None,
            patient_id: None,
            limit: 20,
            offset: 0,
        }
    }
}

impl EmergencyOverrideFilter {
    pub fn for_patient(patient_id: &str) -> Self {
        EmergencyOverrideFilter {
            patient_id: Some(patient_id.to_string()),
            limit: usize::MAX,
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &EmergencyOverride) -> bool {
        self.since.map_or(true, |s| record.access_time >= s)
            && self.until.map_or(true, |u| record.access_time <= u)
            && self.doctor_id.as_deref().map_or(true, |d| d == record.doctor_user_id)
            && self.patient_id.as_deref().map_or(true, |p| p == record.patient_id)
    }
}
