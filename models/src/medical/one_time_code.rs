// models/src/medical/one_time_code.rs
use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// A short numeric secret bound to the doctor who asked for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeCode {
    pub code: String,
    pub bound_doctor_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OneTimeCode {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_bound_to(&self, doctor_id: &str) -> bool {
        self.bound_doctor_id == doctor_id
    }
}

/// Per-patient keyed record holding the outstanding codes.
///
/// Kept apart from the patient profile so code issuance never races with
/// unrelated profile edits. The store swaps whole slots atomically.
/// Mismatches are counted per submitting doctor, so one doctor's typos never
/// touch a code bound to someone else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSlot {
    pub patient_id: String,
    pub codes: Vec<OneTimeCode>,
    #[serde(default)]
    pub failed_attempts: BTreeMap<String, u32>,
}

impl CodeSlot {
    pub fn new(patient_id: impl Into<String>) -> Self {
        CodeSlot {
            patient_id: patient_id.into(),
            codes: Vec::new(),
            failed_attempts: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn live_code_for(&self, doctor_id: &str, now: DateTime<Utc>) -> Option<&OneTimeCode> {
        self.codes
            .iter()
            .find(|c| c.is_bound_to(doctor_id) && c.is_live(now))
    }

    pub fn find_code(&self, submitted: &str) -> Option<&OneTimeCode> {
        self.codes.iter().find(|c| c.code == submitted)
    }

    pub fn contains_live_code(&self, code: &str, now: DateTime<Utc>) -> bool {
        self.codes.iter().any(|c| c.code == code && c.is_live(now))
    }

    /// Drops codes that are no longer live. Returns how many were removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.codes.len();
        self.codes.retain(|c| c.is_live(now));
        before - self.codes.len()
    }

    pub fn remove_code(&mut self, code: &str) -> Option<OneTimeCode> {
        let pos = self.codes.iter().position(|c| c.code == code)?;
        Some(self.codes.remove(pos))
    }

    pub fn remove_codes_for(&mut self, doctor_id: &str) {
        self.codes.retain(|c| !c.is_bound_to(doctor_id));
    }

    pub fn attempts_by(&self, doctor_id: &str) -> u32 {
        self.failed_attempts.get(doctor_id).copied().unwrap_or(0)
    }

    /// Bumps the doctor's mismatch counter and returns the new count.
    pub fn record_failed_attempt(&mut self, doctor_id: &str) -> u32 {
        let count = self.failed_attempts.entry(doctor_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn reset_attempts(&mut self, doctor_id: &str) {
        self.failed_attempts.remove(doctor_id);
    }

    /// `None` when nothing is left to keep, so the store can drop the key.
    pub fn into_persisted(self) -> Option<CodeSlot> {
        if self.codes.is_empty() && self.failed_attempts.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}
