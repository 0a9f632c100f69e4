// lib/src/storage_engine/sled_storage.rs
use std::fmt;
use std::path::Path;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Config, Db, IVec, Tree};
use uuid::Uuid;

use models::errors::{AccessError, AccessResult};
use models::medical::{
    AuditFilter, AuditLogEntry, CodeSlot, ConsentRequest, ConsentRequestFilter, ConsentStatus,
    EmergencyOverride, EmergencyOverrideFilter, Hospital, MedicationStatus, NotificationMessage,
    ObservationRecord, PassportAccessRecord, PatientPassport, UserProfile,
};
use crate::storage_engine::storage_engine::{
    paginate, AuditLogStore, ConsentRequestStore, DirectoryStore, EmergencyOverrideStore,
    NotificationStore, ObservationStore, OneTimeCodeStore, PassportStore,
};

const CONSENT_REQUESTS_TREE: &str = "consent_requests";
const CODE_SLOTS_TREE: &str = "code_slots";
const EMERGENCY_OVERRIDES_TREE: &str = "emergency_overrides";
const AUDIT_LOG_TREE: &str = "audit_log";
const NOTIFICATIONS_TREE: &str = "notifications";
const PASSPORTS_TREE: &str = "passports";
const OBSERVATIONS_TREE: &str = "observations";
const USERS_TREE: &str = "users";
const HOSPITALS_TREE: &str = "hospitals";

/// Persistent backend: one sled tree per collection, JSON-encoded values.
/// Conditional writes go through `Tree::compare_and_swap`.
pub struct SledStorage {
    db: Db,
    consent_requests: Tree,
    code_slots: Tree,
    emergency_overrides: Tree,
    audit_log: Tree,
    notifications: Tree,
    passports: Tree,
    observations: Tree,
    users: Tree,
    hospitals: Tree,
}

impl fmt::Debug for SledStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SledStorage")
            .field("was_recovered", &self.db.was_recovered())
            .finish()
    }
}

impl SledStorage {
    pub fn open(path: &Path) -> AccessResult<Self> {
        info!("Opening sled access store at {:?}", path);
        let db = Config::new().path(path).open()?;
        Self::from_db(db)
    }

    /// Throwaway database, removed when dropped.
    pub fn temporary() -> AccessResult<Self> {
        let db = Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> AccessResult<Self> {
        Ok(SledStorage {
            consent_requests: db.open_tree(CONSENT_REQUESTS_TREE)?,
            code_slots: db.open_tree(CODE_SLOTS_TREE)?,
            emergency_overrides: db.open_tree(EMERGENCY_OVERRIDES_TREE)?,
            audit_log: db.open_tree(AUDIT_LOG_TREE)?,
            notifications: db.open_tree(NOTIFICATIONS_TREE)?,
            passports: db.open_tree(PASSPORTS_TREE)?,
            observations: db.open_tree(OBSERVATIONS_TREE)?,
            users: db.open_tree(USERS_TREE)?,
            hospitals: db.open_tree(HOSPITALS_TREE)?,
            db,
        })
    }

    pub async fn flush(&self) -> AccessResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    /// Monotonic key so append-only trees iterate in insertion order.
    fn next_sequence_key(&self) -> AccessResult<[u8; 8]> {
        Ok(self.db.generate_id()?.to_be_bytes())
    }
}

fn encode<T: Serialize>(value: &T) -> AccessResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> AccessResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn get_json<T: DeserializeOwned>(tree: &Tree, key: &[u8]) -> AccessResult<Option<T>> {
    match tree.get(key)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

fn put_json<T: Serialize>(tree: &Tree, key: &[u8], value: &T) -> AccessResult<()> {
    tree.insert(key, encode(value)?)?;
    Ok(())
}

fn scan_json<T: DeserializeOwned>(tree: &Tree) -> AccessResult<Vec<T>> {
    tree.iter()
        .values()
        .map(|value| {
            let bytes: IVec = value?;
            decode(&bytes)
        })
        .collect()
}

/// Read-modify-write under compare-and-swap, retried until it lands.
/// `apply` returning `None` aborts without writing.
fn update_json<T, F>(tree: &Tree, key: &[u8], mut apply: F) -> AccessResult<Option<T>>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Option<T>) -> Option<T>,
{
    loop {
        let current = tree.get(key)?;
        let decoded = match &current {
            Some(bytes) => Some(decode::<T>(bytes)?),
            None => None,
        };
        let next = match apply(decoded) {
            Some(next) => next,
            None => return Ok(None),
        };
        let encoded = encode(&next)?;
        match tree.compare_and_swap(key, current, Some(encoded))? {
            Ok(()) => return Ok(Some(next)),
            Err(_) => debug!("Concurrent write on {:?}, retrying", String::from_utf8_lossy(key)),
        }
    }
}

#[async_trait]
impl ConsentRequestStore for SledStorage {
    async fn insert_consent_request(&self, request: ConsentRequest) -> AccessResult<()> {
        put_json(&self.consent_requests, request.id.as_bytes(), &request)
    }

    async fn get_consent_request(&self, id: &Uuid) -> AccessResult<Option<ConsentRequest>> {
        get_json(&self.consent_requests, id.as_bytes())
    }

    async fn update_consent_request(&self, request: ConsentRequest) -> AccessResult<()> {
        put_json(&self.consent_requests, request.id.as_bytes(), &request)
    }

    async fn delete_consent_request(&self, id: &Uuid) -> AccessResult<()> {
        self.consent_requests.remove(id.as_bytes())?;
        Ok(())
    }

    async fn update_consent_request_if_pending(&self, request: ConsentRequest) -> AccessResult<bool> {
        let key = *request.id.as_bytes();
        let written = update_json::<ConsentRequest, _>(&self.consent_requests, &key, |stored| match stored {
            Some(stored) if stored.status == ConsentStatus::Pending => Some(request.clone()),
            _ => None,
        })?;
        Ok(written.is_some())
    }

    async fn find_consent_requests(&self, filter: &ConsentRequestFilter) -> AccessResult<Vec<ConsentRequest>> {
        let mut found: Vec<ConsentRequest> = scan_json::<ConsentRequest>(&self.consent_requests)?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[async_trait]
impl OneTimeCodeStore for SledStorage {
    async fn get_code_slot(&self, patient_id: &str) -> AccessResult<Option<CodeSlot>> {
        get_json(&self.code_slots, patient_id.as_bytes())
    }

    async fn compare_and_swap_code_slot(
        &self,
        patient_id: &str,
        expected: Option<&CodeSlot>,
        new: Option<CodeSlot>,
    ) -> AccessResult<bool> {
        let key = patient_id.as_bytes();
        let current = self.code_slots.get(key)?;
        let decoded: Option<CodeSlot> = match &current {
            Some(bytes) => Some(decode(bytes)?),
            None => None,
        };
        if decoded.as_ref() != expected {
            return Ok(false);
        }
        let encoded = match new {
            Some(slot) => Some(encode(&slot)?),
            None => None,
        };
        // Swap against the exact bytes read, so a concurrent writer in between loses us the race.
        Ok(self.code_slots.compare_and_swap(key, current, encoded)?.is_ok())
    }
}

#[async_trait]
impl EmergencyOverrideStore for SledStorage {
    async fn insert_emergency_override(&self, record: EmergencyOverride) -> AccessResult<()> {
        let key = self.next_sequence_key()?;
        put_json(&self.emergency_overrides, &key, &record)
    }

    async fn latest_emergency_override(
        &self,
        doctor_user_id: &str,
        patient_id: &str,
    ) -> AccessResult<Option<EmergencyOverride>> {
        Ok(scan_json::<EmergencyOverride>(&self.emergency_overrides)?
            .into_iter()
            .filter(|o| o.doctor_user_id == doctor_user_id && o.patient_id == patient_id)
            .max_by_key(|o| o.access_time))
    }

    async fn find_emergency_overrides(&self, filter: &EmergencyOverrideFilter) -> AccessResult<Vec<EmergencyOverride>> {
        let mut found: Vec<EmergencyOverride> = scan_json::<EmergencyOverride>(&self.emergency_overrides)?
            .into_iter()
            .filter(|o| filter.matches(o))
            .collect();
        found.sort_by(|a, b| b.access_time.cmp(&a.access_time));
        Ok(paginate(found, filter.offset, filter.limit))
    }

    async fn count_emergency_overrides(&self, filter: &EmergencyOverrideFilter) -> AccessResult<usize> {
        Ok(scan_json::<EmergencyOverride>(&self.emergency_overrides)?
            .iter()
            .filter(|o| filter.matches(o))
            .count())
    }
}

#[async_trait]
impl AuditLogStore for SledStorage {
    async fn append_audit_entry(&self, entry: AuditLogEntry) -> AccessResult<()> {
        let key = self.next_sequence_key()?;
        put_json(&self.audit_log, &key, &entry)?;
        self.audit_log.flush_async().await?;
        Ok(())
    }

    async fn find_audit_entries(&self, filter: &AuditFilter) -> AccessResult<Vec<AuditLogEntry>> {
        let mut found = Vec::new();
        for value in self.audit_log.iter().values().rev() {
            let entry: AuditLogEntry = decode(&value?)?;
            if filter.matches(&entry) {
                found.push(entry);
            }
        }
        Ok(paginate(found, filter.offset, filter.limit))
    }

    async fn count_audit_entries(&self, filter: &AuditFilter) -> AccessResult<usize> {
        Ok(scan_json::<AuditLogEntry>(&self.audit_log)?
            .iter()
            .filter(|e| filter.matches(e))
            .count())
    }
}

#[async_trait]
impl NotificationStore for SledStorage {
    async fn insert_notification(&self, notification: NotificationMessage) -> AccessResult<()> {
        put_json(&self.notifications, notification.id.as_bytes(), &notification)
    }

    async fn get_notification(&self, id: &Uuid) -> AccessResult<Option<NotificationMessage>> {
        get_json(&self.notifications, id.as_bytes())
    }

    async fn mark_notification_read(&self, id: &Uuid, at: DateTime<Utc>) -> AccessResult<Option<NotificationMessage>> {
        update_json::<NotificationMessage, _>(&self.notifications, id.as_bytes(), |stored| {
            stored.map(|mut n| {
                if !n.is_read {
                    n.is_read = true;
                    n.read_at = Some(at);
                }
                n
            })
        })
    }

    async fn find_notifications(&self, recipient_user_id: &str, unread_only: bool) -> AccessResult<Vec<NotificationMessage>> {
        let mut found: Vec<NotificationMessage> = scan_json::<NotificationMessage>(&self.notifications)?
            .into_iter()
            .filter(|n| n.recipient_user_id == recipient_user_id && (!unread_only || !n.is_read))
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[async_trait]
impl PassportStore for SledStorage {
    async fn get_passport(&self, patient_id: &str) -> AccessResult<Option<PatientPassport>> {
        get_json(&self.passports, patient_id.as_bytes())
    }

    async fn append_passport_access(&self, patient_id: &str, record: PassportAccessRecord) -> AccessResult<PatientPassport> {
        update_json::<PatientPassport, _>(&self.passports, patient_id.as_bytes(), |stored| {
            let mut passport = stored.unwrap_or_else(|| PatientPassport::new(patient_id, record.access_date));
            passport.add_access_record(record.clone());
            Some(passport)
        })?
        .ok_or_else(|| AccessError::StorageError(format!("passport for {} was not written", patient_id)))
    }
}

#[async_trait]
impl ObservationStore for SledStorage {
    async fn get_observation(&self, id: &Uuid) -> AccessResult<Option<ObservationRecord>> {
        get_json(&self.observations, id.as_bytes())
    }

    async fn put_observation(&self, record: ObservationRecord) -> AccessResult<()> {
        put_json(&self.observations, record.id.as_bytes(), &record)
    }

    async fn record_observation_edit(
        &self,
        id: &Uuid,
        clinician_id: &str,
        at: DateTime<Utc>,
    ) -> AccessResult<Option<ObservationRecord>> {
        update_json::<ObservationRecord, _>(&self.observations, id.as_bytes(), |stored| {
            stored.map(|mut record| {
                record.add_editor(clinician_id);
                record.last_edited_at = Some(at);
                record
            })
        })
    }

    async fn set_medication_status(
        &self,
        id: &Uuid,
        status: MedicationStatus,
    ) -> AccessResult<Option<ObservationRecord>> {
        update_json::<ObservationRecord, _>(&self.observations, id.as_bytes(), |stored| {
            stored.map(|mut record| {
                record.medication_status = Some(status);
                record
            })
        })
    }
}

#[async_trait]
impl DirectoryStore for SledStorage {
    async fn get_user(&self, id: &str) -> AccessResult<Option<UserProfile>> {
        get_json(&self.users, id.as_bytes())
    }

    async fn put_user(&self, user: UserProfile) -> AccessResult<()> {
        put_json(&self.users, user.id.as_bytes(), &user)
    }

    async fn get_hospital(&self, id: &str) -> AccessResult<Option<Hospital>> {
        get_json(&self.hospitals, id.as_bytes())
    }

    async fn put_hospital(&self, hospital: Hospital) -> AccessResult<()> {
        put_json(&self.hospitals, hospital.id.as_bytes(), &hospital)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use models::medical::{DataCategory, ObservationKind, OneTimeCode, RequestType};

    fn pending_request(now: DateTime<Utc>) -> ConsentRequest {
        ConsentRequest {
            id: Uuid::new_v4(),
            patient_id: "p-1".into(),
            doctor_id: "doc-a".into(),
            hospital_id: "h-1".into(),
            request_type: RequestType::View,
            reason: "routine follow-up".into(),
            requested_data: [DataCategory::Allergies].into_iter().collect(),
            status: ConsentStatus::Pending,
            expires_at: now + Duration::hours(24),
            approved_at: None,
            denied_at: None,
            patient_response: None,
            patient_response_at: None,
            patient_response_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn should_only_update_pending_requests() {
        let storage = SledStorage::temporary().unwrap();
        let now = Utc::now();
        let mut request = pending_request(now);
        storage.insert_consent_request(request.clone()).await.unwrap();

        request.status = ConsentStatus::Approved;
        request.approved_at = Some(now);
        assert!(storage.update_consent_request_if_pending(request.clone()).await.unwrap());

        request.status = ConsentStatus::Denied;
        assert!(!storage.update_consent_request_if_pending(request.clone()).await.unwrap());
        let stored = storage.get_consent_request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConsentStatus::Approved);
    }

    #[tokio::test]
    async fn should_swap_code_slot_conditionally() {
        let storage = SledStorage::temporary().unwrap();
        let now = Utc::now();
        let mut slot = CodeSlot::new("p-1");
        slot.codes.push(OneTimeCode {
            code: "654321".into(),
            bound_doctor_id: "doc-a".into(),
            issued_at: now,
            expires_at: now + Duration::minutes(10),
        });
        assert!(storage.compare_and_swap_code_slot("p-1", None, Some(slot.clone())).await.unwrap());
        assert!(!storage.compare_and_swap_code_slot("p-1", None, None).await.unwrap());
        assert!(storage.compare_and_swap_code_slot("p-1", Some(&slot), None).await.unwrap());
        assert!(storage.get_code_slot("p-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_grow_editable_by_as_a_set() {
        let storage = SledStorage::temporary().unwrap();
        let record = ObservationRecord::new("p-1", ObservationKind::Condition).synced_at(Utc::now());
        let id = record.id;
        storage.put_observation(record).await.unwrap();
        let at = Utc::now();
        storage.record_observation_edit(&id, "doc-x", at).await.unwrap();
        let updated = storage.record_observation_edit(&id, "doc-x", at).await.unwrap().unwrap();
        assert_eq!(updated.editable_by, vec!["doc-x".to_string()]);
        assert_eq!(updated.last_edited_at, Some(at));
    }

    #[tokio::test]
    async fn should_create_passport_on_first_access() {
        let storage = SledStorage::temporary().unwrap();
        let record = PassportAccessRecord {
            doctor_id: "doc-a".into(),
            access_date: Utc::now(),
            access_type: models::medical::PassportAccessType::Otp,
            reason: "OTP verified".into(),
            otp_verified: true,
        };
        let passport = storage.append_passport_access("p-1", record.clone()).await.unwrap();
        assert_eq!(passport.access_history.len(), 1);
        let passport = storage.append_passport_access("p-1", record).await.unwrap();
        assert_eq!(passport.access_history.len(), 2);
    }
}
