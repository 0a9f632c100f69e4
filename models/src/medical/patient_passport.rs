// models/src/medical/patient_passport.rs
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassportAccessType {
    Otp,
    Emergency,
    Consent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassportAccessRecord {
    pub doctor_id: String,
    pub access_date: DateTime<Utc>,
    pub access_type: PassportAccessType,
    pub reason: String,
    pub otp_verified: bool,
}

/// The patient's portable record; here only its access history matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientPassport {
    pub patient_id: String,
    pub access_history: Vec<PassportAccessRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientPassport {
    pub fn new(patient_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        PatientPassport {
            patient_id: patient_id.into(),
            access_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_access_record(&mut self, record: PassportAccessRecord) {
        self.updated_at = record.access_date;
        self.access_history.push(record);
    }
}
