// models/src/medical/observation.rs
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    Condition,
    Medication,
    Test,
    Visit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MedicationStatus {
    Active,
    Past,
}

/// A clinical data point, possibly synchronized in from an external system.
///
/// Only the fields that gate editing are modelled; the clinical payload
/// stays opaque in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRecord {
    pub id: Uuid,
    pub patient_id: String,
    pub kind: ObservationKind,
    pub sync_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub editable_by: Vec<String>,
    pub created_by: Option<String>,
    pub last_edited_at: Option<DateTime<Utc>>,
    pub medication_status: Option<MedicationStatus>,
    #[serde(default)]
    pub data: Value,
}

impl ObservationRecord {
    pub fn new(patient_id: impl Into<String>, kind: ObservationKind) -> Self {
        ObservationRecord {
            id: Uuid::new_v4(),
            patient_id: patient_id.into(),
            kind,
            sync_date: None,
            editable_by: Vec::new(),
            created_by: None,
            last_edited_at: None,
            medication_status: None,
            data: Value::Null,
        }
    }

    pub fn synced_at(mut self, sync_date: DateTime<Utc>) -> Self {
        self.sync_date = Some(sync_date);
        self
    }

    pub fn created_by(mut self, clinician_id: impl Into<String>) -> Self {
        self.created_by = Some(clinician_id.into());
        self
    }

    /// Allow-list membership, counting the creator.
    pub fn is_allow_listed(&self, clinician_id: &str) -> bool {
        self.editable_by.iter().any(|id| id == clinician_id)
            || self.created_by.as_deref() == Some(clinician_id)
    }

    /// Set-append; returns whether the list grew.
    pub fn add_editor(&mut self, clinician_id: &str) -> bool {
        if self.editable_by.iter().any(|id| id == clinician_id) {
            false
        } else {
            self.editable_by.push(clinician_id.to_string());
            true
        }
    }
}

/// Where a record sits in its edit lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditWindow {
    /// No sync provenance; anyone may edit.
    NotSynced,
    /// Inside the grace window after sync; anyone may edit.
    Open,
    /// Grace window closed; only allow-listed clinicians may edit.
    Locked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditAccessInfo {
    pub window: EditWindow,
    /// Whether anyone at all may edit without being allow-listed.
    pub open_to_all: bool,
    /// Per-clinician answer, present when a clinician was supplied.
    pub can_edit: Option<bool>,
    pub hours_since_sync: Option<f64>,
    pub medication_status: Option<MedicationStatus>,
    pub reason: String,
    pub sync_date: Option<DateTime<Utc>>,
    pub editable_by: Vec<String>,
}
