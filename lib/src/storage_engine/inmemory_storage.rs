// lib/src/storage_engine/inmemory_storage.rs
use std::collections::HashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::Mutex as TokioMutex;
use uuid::Uuid;

use models::errors::AccessResult;
use models::medical::{
    AuditFilter, AuditLogEntry, CodeSlot, ConsentRequest, ConsentRequestFilter, ConsentStatus,
    EmergencyOverride, EmergencyOverrideFilter, Hospital, MedicationStatus, NotificationMessage,
    ObservationRecord, PassportAccessRecord, PatientPassport, UserProfile,
};
use crate::storage_engine::storage_engine::{
    paginate, AuditLogStore, ConsentRequestStore, DirectoryStore, EmergencyOverrideStore,
    NotificationStore, ObservationStore, OneTimeCodeStore, PassportStore,
};

/// Process-local backend. Each collection sits behind its own lock so a
/// conditional update on one never waits on another.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    consent_requests: TokioMutex<HashMap<Uuid, ConsentRequest>>,
    code_slots: TokioMutex<HashMap<String, CodeSlot>>,
    emergency_overrides: TokioMutex<Vec<EmergencyOverride>>,
    audit_log: TokioMutex<Vec<AuditLogEntry>>,
    notifications: TokioMutex<HashMap<Uuid, NotificationMessage>>,
    passports: TokioMutex<HashMap<String, PatientPassport>>,
    observations: TokioMutex<HashMap<Uuid, ObservationRecord>>,
    users: TokioMutex<HashMap<String, UserProfile>>,
    hospitals: TokioMutex<HashMap<String, Hospital>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsentRequestStore for InMemoryStorage {
    async fn insert_consent_request(&self, request: ConsentRequest) -> AccessResult<()> {
        let mut requests = self.consent_requests.lock().await;
        requests.insert(request.id, request);
        Ok(())
    }

    async fn get_consent_request(&self, id: &Uuid) -> AccessResult<Option<ConsentRequest>> {
        let requests = self.consent_requests.lock().await;
        Ok(requests.get(id).cloned())
    }

    async fn update_consent_request(&self, request: ConsentRequest) -> AccessResult<()> {
        let mut requests = self.consent_requests.lock().await;
        requests.insert(request.id, request);
        Ok(())
    }

    async fn delete_consent_request(&self, id: &Uuid) -> AccessResult<()> {
        let mut requests = self.consent_requests.lock().await;
        requests.remove(id);
        Ok(())
    }

    async fn update_consent_request_if_pending(&self, request: ConsentRequest) -> AccessResult<bool> {
        let mut requests = self.consent_requests.lock().await;
        match requests.get(&request.id) {
            Some(stored) if stored.status == ConsentStatus::Pending => {
                requests.insert(request.id, request);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_consent_requests(&self, filter: &ConsentRequestFilter) -> AccessResult<Vec<ConsentRequest>> {
        let requests = self.consent_requests.lock().await;
        let mut found: Vec<ConsentRequest> = requests.values().filter(|r| filter.matches(r)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[async_trait]
impl OneTimeCodeStore for InMemoryStorage {
    async fn get_code_slot(&self, patient_id: &str) -> AccessResult<Option<CodeSlot>> {
        let slots = self.code_slots.lock().await;
        Ok(slots.get(patient_id).cloned())
    }

    async fn compare_and_swap_code_slot(
        &self,
        patient_id: &str,
        expected: Option<&CodeSlot>,
        new: Option<CodeSlot>,
    ) -> AccessResult<bool> {
        let mut slots = self.code_slots.lock().await;
        if slots.get(patient_id) != expected {
            debug!("Code slot for patient {} changed underneath, swap rejected", patient_id);
            return Ok(false);
        }
        match new {
            Some(slot) => {
                slots.insert(patient_id.to_string(), slot);
            }
            None => {
                slots.remove(patient_id);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl EmergencyOverrideStore for InMemoryStorage {
    async fn insert_emergency_override(&self, record: EmergencyOverride) -> AccessResult<()> {
        let mut overrides = self.emergency_overrides.lock().await;
        overrides.push(record);
        Ok(())
    }

    async fn latest_emergency_override(
        &self,
        doctor_user_id: &str,
        patient_id: &str,
    ) -> AccessResult<Option<EmergencyOverride>> {
        let overrides = self.emergency_overrides.lock().await;
        Ok(overrides
            .iter()
            .filter(|o| o.doctor_user_id == doctor_user_id && o.patient_id == patient_id)
            .max_by_key(|o| o.access_time)
            .cloned())
    }

    async fn find_emergency_overrides(&self, filter: &EmergencyOverrideFilter) -> AccessResult<Vec<EmergencyOverride>> {
        let overrides = self.emergency_overrides.lock().await;
        let mut found: Vec<EmergencyOverride> = overrides.iter().filter(|o| filter.matches(o)).cloned().collect();
        found.sort_by(|a, b| b.access_time.cmp(&a.access_time));
        Ok(paginate(found, filter.offset, filter.limit))
    }

    async fn count_emergency_overrides(&self, filter: &EmergencyOverrideFilter) -> AccessResult<usize> {
        let overrides = self.emergency_overrides.lock().await;
        Ok(overrides.iter().filter(|o| filter.matches(o)).count())
    }
}

#[async_trait]
impl AuditLogStore for InMemoryStorage {
    async fn append_audit_entry(&self, entry: AuditLogEntry) -> AccessResult<()> {
        let mut log = self.audit_log.lock().await;
        log.push(entry);
        Ok(())
    }

    async fn find_audit_entries(&self, filter: &AuditFilter) -> AccessResult<Vec<AuditLogEntry>> {
        let log = self.audit_log.lock().await;
        // Reverse insertion order keeps ties on access_time stable, newest first.
        let found: Vec<AuditLogEntry> = log.iter().rev().filter(|e| filter.matches(e)).cloned().collect();
        Ok(paginate(found, filter.offset, filter.limit))
    }

    async fn count_audit_entries(&self, filter: &AuditFilter) -> AccessResult<usize> {
        let log = self.audit_log.lock().await;
        Ok(log.iter().filter(|e| filter.matches(e)).count())
    }
}

#[async_trait]
impl NotificationStore for InMemoryStorage {
    async fn insert_notification(&self, notification: NotificationMessage) -> AccessResult<()> {
        let mut notifications = self.notifications.lock().await;
        notifications.insert(notification.id, notification);
        Ok(())
    }

    async fn get_notification(&self, id: &Uuid) -> AccessResult<Option<NotificationMessage>> {
        let notifications = self.notifications.lock().await;
        Ok(notifications.get(id).cloned())
    }

    async fn mark_notification_read(&self, id: &Uuid, at: DateTime<Utc>) -> AccessResult<Option<NotificationMessage>> {
        let mut notifications = self.notifications.lock().await;
        Ok(notifications.get_mut(id).map(|n| {
            if !n.is_read {
                n.is_read = true;
                n.read_at = Some(at);
            }
            n.clone()
        }))
    }

    async fn find_notifications(&self, recipient_user_id: &str, unread_only: bool) -> AccessResult<Vec<NotificationMessage>> {
        let notifications = self.notifications.lock().await;
        let mut found: Vec<NotificationMessage> = notifications
            .values()
            .filter(|n| n.recipient_user_id == recipient_user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[async_trait]
impl PassportStore for InMemoryStorage {
    async fn get_passport(&self, patient_id: &str) -> AccessResult<Option<PatientPassport>> {
        let passports = self.passports.lock().await;
        Ok(passports.get(patient_id).cloned())
    }

    async fn append_passport_access(&self, patient_id: &str, record: PassportAccessRecord) -> AccessResult<PatientPassport> {
        let mut passports = self.passports.lock().await;
        let passport = passports
            .entry(patient_id.to_string())
            .or_insert_with(|| PatientPassport::new(patient_id, record.access_date));
        passport.add_access_record(record);
        Ok(passport.clone())
    }
}

#[async_trait]
impl ObservationStore for InMemoryStorage {
    async fn get_observation(&self, id: &Uuid) -> AccessResult<Option<ObservationRecord>> {
        let observations = self.observations.lock().await;
        Ok(observations.get(id).cloned())
    }

    async fn put_observation(&self, record: ObservationRecord) -> AccessResult<()> {
        let mut observations = self.observations.lock().await;
        observations.insert(record.id, record);
        Ok(())
    }

    async fn record_observation_edit(
        &self,
        id: &Uuid,
        clinician_id: &str,
        at: DateTime<Utc>,
    ) -> AccessResult<Option<ObservationRecord>> {
        let mut observations = self.observations.lock().await;
        Ok(observations.get_mut(id).map(|record| {
            record.add_editor(clinician_id);
            record.last_edited_at = Some(at);
            record.clone()
        }))
    }

    async fn set_medication_status(
        &self,
        id: &Uuid,
        status: MedicationStatus,
    ) -> AccessResult<Option<ObservationRecord>> {
        let mut observations = self.observations.lock().await;
        Ok(observations.get_mut(id).map(|record| {
            record.medication_status = Some(status);
            record.clone()
        }))
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStorage {
    async fn get_user(&self, id: &str) -> AccessResult<Option<UserProfile>> {
        let users = self.users.lock().await;
        Ok(users.get(id).cloned())
    }

    async fn put_user(&self, user: UserProfile) -> AccessResult<()> {
        let mut users = self.users.lock().await;
        users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get_hospital(&self, id: &str) -> AccessResult<Option<Hospital>> {
        let hospitals = self.hospitals.lock().await;
        Ok(hospitals.get(id).cloned())
    }

    async fn put_hospital(&self, hospital: Hospital) -> AccessResult<()> {
        let mut hospitals = self.hospitals.lock().await;
        hospitals.insert(hospital.id.clone(), hospital);
        Ok(())
    }
}
