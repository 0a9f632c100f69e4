// models/src/medical/consent_request.rs
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::errors::AccessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    View,
    Edit,
    Emergency,
}

impl RequestType {
    pub fn label(&self) -> &'static str {
        match self {
            RequestType::View => "View Only",
            RequestType::Edit => "Edit Access",
            RequestType::Emergency => "Emergency Access",
        }
    }
}

/// Fixed vocabulary of data a clinician may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    MedicalHistory,
    Medications,
    Allergies,
    LabResults,
    Imaging,
    EmergencyContacts,
    Insurance,
}

impl DataCategory {
    pub const ALL: [DataCategory; 7] = [
        DataCategory::MedicalHistory,
        DataCategory::Medications,
        DataCategory::Allergies,
        DataCategory::LabResults,
        DataCategory::Imaging,
        DataCategory::EmergencyContacts,
        DataCategory::Insurance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::MedicalHistory => "medical_history",
            DataCategory::Medications => "medications",
            DataCategory::Allergies => "allergies",
            DataCategory::LabResults => "lab_results",
            DataCategory::Imaging => "imaging",
            DataCategory::EmergencyContacts => "emergency_contacts",
            DataCategory::Insurance => "insurance",
        }
    }

    /// Human-readable label used in patient-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            DataCategory::MedicalHistory => "Medical History",
            DataCategory::Medications => "Current Medications",
            DataCategory::Allergies => "Allergies & Reactions",
            DataCategory::LabResults => "Lab Results",
            DataCategory::Imaging => "Imaging Reports",
            DataCategory::EmergencyContacts => "Emergency Contacts",
            DataCategory::Insurance => "Insurance Information",
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataCategory {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| AccessError::Validation(format!("unknown requested data category '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

impl ConsentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConsentStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentStatus::Pending => "pending",
            ConsentStatus::Approved => "approved",
            ConsentStatus::Denied => "denied",
            ConsentStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two answers a patient can give.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentDecision {
    Approved,
    Denied,
}

impl From<ConsentDecision> for ConsentStatus {
    fn from(decision: ConsentDecision) -> Self {
        match decision {
            ConsentDecision::Approved => ConsentStatus::Approved,
            ConsentDecision::Denied => ConsentStatus::Denied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    pub id: Uuid,
    pub patient_id: String,
    pub doctor_id: String,
    pub hospital_id: String,
    pub request_type: RequestType,
    pub reason: String,
    pub requested_data: BTreeSet<DataCategory>,
    pub status: ConsentStatus,
    pub expires_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub denied_at: Option<DateTime<Utc>>,
    pub patient_response: Option<ConsentDecision>,
    pub patient_response_at: Option<DateTime<Utc>>,
    pub patient_response_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConsentRequest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Status as observed at `now`. The stored value is only a cache.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ConsentStatus {
        if self.is_expired(now) {
            ConsentStatus::Expired
        } else {
            self.status
        }
    }

    /// Brings the stored status in line with `now`; returns whether it changed.
    pub fn normalize(&mut self, now: DateTime<Utc>) -> bool {
        let derived = self.effective_status(now);
        if derived != self.status {
            self.status = derived;
            self.updated_at = now;
            true
        } else {
            false
        }
    }

    /// Copy with the derived status applied, for read paths.
    pub fn observed(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }

    pub fn grants_access(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == ConsentStatus::Approved
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.patient_id == user_id || self.doctor_id == user_id
    }

    /// Moves a pending request to its terminal state. The caller normalizes first.
    pub fn record_decision(
        &mut self,
        decision: ConsentDecision,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AccessError> {
        if self.status != ConsentStatus::Pending {
            return Err(AccessError::InvalidState(format!(
                "access request {} has already been {}",
                self.id, self.status
            )));
        }
        self.status = decision.into();
        match decision {
            ConsentDecision::Approved => self.approved_at = Some(now),
            ConsentDecision::Denied => self.denied_at = Some(now),
        }
        self.patient_response = Some(decision);
        self.patient_response_at = Some(now);
        self.patient_response_reason = reason;
        self.updated_at = now;
        Ok(())
    }

    pub fn requested_data_labels(&self) -> String {
        self.requested_data
            .iter()
            .map(|c| c.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Selection over stored requests; status matches the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequestFilter {
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub status: Option<ConsentStatus>,
}

impl ConsentRequestFilter {
    pub fn for_pair(doctor_id: &str, patient_id: &str) -> Self {
        ConsentRequestFilter {
            patient_id: Some(patient_id.to_string()),
            doctor_id: Some(doctor_id.to_string()),
            status: None,
        }
    }

    pub fn matches(&self, request: &ConsentRequest) -> bool {
        self.patient_id.as_deref().map_or(true, |p| p == request.patient_id)
            && self.doctor_id.as_deref().map_or(true, |d| d == request.doctor_id)
            && self.status.map_or(true, |s| s == request.status)
    }
}
