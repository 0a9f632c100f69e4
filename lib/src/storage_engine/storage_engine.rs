// lib/src/storage_engine/storage_engine.rs
use std::fmt::Debug;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use models::errors::AccessResult;
use models::medical::{
    AuditFilter, AuditLogEntry, CodeSlot, ConsentRequest, ConsentRequestFilter, EmergencyOverride,
    EmergencyOverrideFilter, Hospital, MedicationStatus, NotificationMessage, ObservationRecord,
    PassportAccessRecord, PatientPassport, UserProfile,
};

#[async_trait]
pub trait ConsentRequestStore: Send + Sync + Debug + 'static {
    async fn insert_consent_request(&self, request: ConsentRequest) -> AccessResult<()>;

    async fn get_consent_request(&self, id: &Uuid) -> AccessResult<Option<ConsentRequest>>;

    async fn update_consent_request(&self, request: ConsentRequest) -> AccessResult<()>;

    async fn delete_consent_request(&self, id: &Uuid) -> AccessResult<()>;

    /// Writes `request` only if the stored row is still `pending`.
    /// Returns `false` (and writes nothing) when another writer got there first.
    async fn update_consent_request_if_pending(&self, request: ConsentRequest) -> AccessResult<bool>;

    /// Matches on the stored status; callers re-derive expiry themselves.
    async fn find_consent_requests(&self, filter: &ConsentRequestFilter) -> AccessResult<Vec<ConsentRequest>>;
}

#[async_trait]
pub trait OneTimeCodeStore: Send + Sync + Debug + 'static {
    async fn get_code_slot(&self, patient_id: &str) -> AccessResult<Option<CodeSlot>>;

    /// Single conditional update of a patient's slot: succeeds only if the
    /// stored value equals `expected` (`None` meaning absent). `new = None`
    /// removes the slot.
    async fn compare_and_swap_code_slot(
        &self,
        patient_id: &str,
        expected: Option<&CodeSlot>,
        new: Option<CodeSlot>,
    ) -> AccessResult<bool>;
}

#[async_trait]
pub trait EmergencyOverrideStore: Send + Sync + Debug + 'static {
    async fn insert_emergency_override(&self, record: EmergencyOverride) -> AccessResult<()>;

    /// Most recent override for the pair, if any.
    async fn latest_emergency_override(
        &self,
        doctor_user_id: &str,
        patient_id: &str,
    ) -> AccessResult<Option<EmergencyOverride>>;

    /// Newest first, paged by `filter.limit`/`filter.offset`.
    async fn find_emergency_overrides(&self, filter: &EmergencyOverrideFilter) -> AccessResult<Vec<EmergencyOverride>>;

    async fn count_emergency_overrides(&self, filter: &EmergencyOverrideFilter) -> AccessResult<usize>;
}

/// Append-only by construction: there is no update or delete.
#[async_trait]
pub trait AuditLogStore: Send + Sync + Debug + 'static {
    async fn append_audit_entry(&self, entry: AuditLogEntry) -> AccessResult<()>;

    /// Newest first, paged by `filter.limit`/`filter.offset`.
    async fn find_audit_entries(&self, filter: &AuditFilter) -> AccessResult<Vec<AuditLogEntry>>;

    async fn count_audit_entries(&self, filter: &AuditFilter) -> AccessResult<usize>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync + Debug + 'static {
    async fn insert_notification(&self, notification: NotificationMessage) -> AccessResult<()>;

    async fn get_notification(&self, id: &Uuid) -> AccessResult<Option<NotificationMessage>>;

    /// Returns the updated notification, or `None` if it does not exist.
    async fn mark_notification_read(&self, id: &Uuid, at: DateTime<Utc>) -> AccessResult<Option<NotificationMessage>>;

    /// Newest first.
    async fn find_notifications(&self, recipient_user_id: &str, unread_only: bool) -> AccessResult<Vec<NotificationMessage>>;
}

#[async_trait]
pub trait PassportStore: Send + Sync + Debug + 'static {
    async fn get_passport(&self, patient_id: &str) -> AccessResult<Option<PatientPassport>>;

    /// Appends to the passport's access history, creating the passport first if needed.
    async fn append_passport_access(&self, patient_id: &str, record: PassportAccessRecord) -> AccessResult<PatientPassport>;
}

#[async_trait]
pub trait ObservationStore: Send + Sync + Debug + 'static {
    async fn get_observation(&self, id: &Uuid) -> AccessResult<Option<ObservationRecord>>;

    async fn put_observation(&self, record: ObservationRecord) -> AccessResult<()>;

    /// Atomically set-appends `clinician_id` to `editable_by` and stamps `last_edited_at`.
    async fn record_observation_edit(
        &self,
        id: &Uuid,
        clinician_id: &str,
        at: DateTime<Utc>,
    ) -> AccessResult<Option<ObservationRecord>>;

    async fn set_medication_status(
        &self,
        id: &Uuid,
        status: MedicationStatus,
    ) -> AccessResult<Option<ObservationRecord>>;
}

#[async_trait]
pub trait DirectoryStore: Send + Sync + Debug + 'static {
    async fn get_user(&self, id: &str) -> AccessResult<Option<UserProfile>>;

    async fn put_user(&self, user: UserProfile) -> AccessResult<()>;

    async fn get_hospital(&self, id: &str) -> AccessResult<Option<Hospital>>;

    async fn put_hospital(&self, hospital: Hospital) -> AccessResult<()>;
}

/// Everything the access-control engines persist.
pub trait AccessStorageEngine:
    ConsentRequestStore
    + OneTimeCodeStore
    + EmergencyOverrideStore
    + AuditLogStore
    + NotificationStore
    + PassportStore
    + ObservationStore
    + DirectoryStore
{
}

impl<T> AccessStorageEngine for T where
    T: ConsentRequestStore
        + OneTimeCodeStore
        + EmergencyOverrideStore
        + AuditLogStore
        + NotificationStore
        + PassportStore
        + ObservationStore
        + DirectoryStore
{
}

/// Applies `offset`/`limit` to an already ordered result set.
pub fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    items.into_iter().skip(offset).take(limit).collect()
}
