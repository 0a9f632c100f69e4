// access_control/tests/common/mod.rs
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use access_control::{AccessControlEngine, EnqueueOutcome, Mailer, NotificationSink, OutboundNotification};
use lib::clock::ManualClock;
use lib::config::AccessControlConfig;
use lib::storage_engine::{
    AuditLogStore, ConsentRequestStore, DirectoryStore, EmergencyOverrideStore, InMemoryStorage, NotificationStore,
    ObservationStore, OneTimeCodeStore, PassportStore,
};
use models::errors::{AccessError, AccessResult};
use models::medical::{
    AuditFilter, AuditLogEntry, CodeSlot, ConsentRequest, ConsentRequestFilter, EmailEnvelope, EmergencyOverride,
    EmergencyOverrideFilter, Hospital, MedicationStatus, NotificationMessage, ObservationRecord, PassportAccessRecord,
    PatientPassport, UserProfile,
};
use models::{ActorContext, Role};

pub const PATIENT: &str = "patient-p";
pub const OTHER_PATIENT: &str = "patient-q";
pub const DOCTOR_A: &str = "doctor-a";
pub const DOCTOR_B: &str = "doctor-b";
pub const ADMIN: &str = "admin-1";
pub const HOSPITAL: &str = "hosp-1";

#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailEnvelope>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailEnvelope> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, envelope: &EmailEnvelope) -> AccessResult<()> {
        self.sent.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, envelope: &EmailEnvelope) -> AccessResult<()> {
        Err(AccessError::DeliveryFailure(format!("smtp unreachable for {}", envelope.to)))
    }
}

/// Sink that refuses everything, like a queue whose worker has stopped.
#[derive(Debug, Default)]
pub struct RejectingSink;

impl NotificationSink for RejectingSink {
    fn enqueue(&self, _notification: OutboundNotification) -> EnqueueOutcome {
        EnqueueOutcome::Rejected("notification queue is closed".into())
    }
}

/// In-memory store whose audit appends can be switched to fail.
#[derive(Debug)]
pub struct AuditOutageStorage {
    inner: Arc<InMemoryStorage>,
    audit_down: AtomicBool,
}

impl AuditOutageStorage {
    pub fn new(inner: Arc<InMemoryStorage>) -> Self {
        AuditOutageStorage {
            inner,
            audit_down: AtomicBool::new(false),
        }
    }

    pub fn set_audit_down(&self, down: bool) {
        self.audit_down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditLogStore for AuditOutageStorage {
    async fn append_audit_entry(&self, entry: AuditLogEntry) -> AccessResult<()> {
        if self.audit_down.load(Ordering::SeqCst) {
            return Err(AccessError::StorageError("audit log unavailable".into()));
        }
        self.inner.append_audit_entry(entry).await
    }

    async fn find_audit_entries(&self, filter: &AuditFilter) -> AccessResult<Vec<AuditLogEntry>> {
        self.inner.find_audit_entries(filter).await
    }

    async fn count_audit_entries(&self, filter: &AuditFilter) -> AccessResult<usize> {
        self.inner.count_audit_entries(filter).await
    }
}

#[async_trait]
impl ConsentRequestStore for AuditOutageStorage {
    async fn insert_consent_request(&self, request: ConsentRequest) -> AccessResult<()> {
        self.inner.insert_consent_request(request).await
    }

    async fn get_consent_request(&self, id: &Uuid) -> AccessResult<Option<ConsentRequest>> {
        self.inner.get_consent_request(id).await
    }

    async fn update_consent_request(&self, request: ConsentRequest) -> AccessResult<()> {
        self.inner.update_consent_request(request).await
    }

    async fn delete_consent_request(&self, id: &Uuid) -> AccessResult<()> {
        self.inner.delete_consent_request(id).await
    }

    async fn update_consent_request_if_pending(&self, request: ConsentRequest) -> AccessResult<bool> {
        self.inner.update_consent_request_if_pending(request).await
    }

    async fn find_consent_requests(&self, filter: &ConsentRequestFilter) -> AccessResult<Vec<ConsentRequest>> {
        self.inner.find_consent_requests(filter).await
    }
}

#[async_trait]
impl OneTimeCodeStore for AuditOutageStorage {
    async fn get_code_slot(&self, patient_id: &str) -> AccessResult<Option<CodeSlot>> {
        self.inner.get_code_slot(patient_id).await
    }

    async fn compare_and_swap_code_slot(
        &self,
        patient_id: &str,
        expected: Option<&CodeSlot>,
        new: Option<CodeSlot>,
    ) -> AccessResult<bool> {
        self.inner.compare_and_swap_code_slot(patient_id, expected, new).await
    }
}

#[async_trait]
impl EmergencyOverrideStore for AuditOutageStorage {
    async fn insert_emergency_override(&self, record: EmergencyOverride) -> AccessResult<()> {
        self.inner.insert_emergency_override(record).await
    }

    async fn latest_emergency_override(
        &self,
        doctor_user_id: &str,
        patient_id: &str,
    ) -> AccessResult<Option<EmergencyOverride>> {
        self.inner.latest_emergency_override(doctor_user_id, patient_id).await
    }

    async fn find_emergency_overrides(&self, filter: &EmergencyOverrideFilter) -> AccessResult<Vec<EmergencyOverride>> {
        self.inner.find_emergency_overrides(filter).await
    }

    async fn count_emergency_overrides(&self, filter: &EmergencyOverrideFilter) -> AccessResult<usize> {
        self.inner.count_emergency_overrides(filter).await
    }
}

#[async_trait]
impl NotificationStore for AuditOutageStorage {
    async fn insert_notification(&self, notification: NotificationMessage) -> AccessResult<()> {
        self.inner.insert_notification(notification).await
    }

    async fn get_notification(&self, id: &Uuid) -> AccessResult<Option<NotificationMessage>> {
        self.inner.get_notification(id).await
    }

    async fn mark_notification_read(&self, id: &Uuid, at: DateTime<Utc>) -> AccessResult<Option<NotificationMessage>> {
        self.inner.mark_notification_read(id, at).await
    }

    async fn find_notifications(&self, recipient_user_id: &str, unread_only: bool) -> AccessResult<Vec<NotificationMessage>> {
        self.inner.find_notifications(recipient_user_id, unread_only).await
    }
}

#[async_trait]
impl PassportStore for AuditOutageStorage {
    async fn get_passport(&self, patient_id: &str) -> AccessResult<Option<PatientPassport>> {
        self.inner.get_passport(patient_id).await
    }

    async fn append_passport_access(&self, patient_id: &str, record: PassportAccessRecord) -> AccessResult<PatientPassport> {
        self.inner.append_passport_access(patient_id, record).await
    }
}

#[async_trait]
impl ObservationStore for AuditOutageStorage {
    async fn get_observation(&self, id: &Uuid) -> AccessResult<Option<ObservationRecord>> {
        self.inner.get_observation(id).await
    }

    async fn put_observation(&self, record: ObservationRecord) -> AccessResult<()> {
        self.inner.put_observation(record).await
    }

    async fn record_observation_edit(
        &self,
        id: &Uuid,
        clinician_id: &str,
        at: DateTime<Utc>,
    ) -> AccessResult<Option<ObservationRecord>> {
        self.inner.record_observation_edit(id, clinician_id, at).await
    }

    async fn set_medication_status(
        &self,
        id: &Uuid,
        status: MedicationStatus,
    ) -> AccessResult<Option<ObservationRecord>> {
        self.inner.set_medication_status(id, status).await
    }
}

#[async_trait]
impl DirectoryStore for AuditOutageStorage {
    async fn get_user(&self, id: &str) -> AccessResult<Option<UserProfile>> {
        self.inner.get_user(id).await
    }

    async fn put_user(&self, user: UserProfile) -> AccessResult<()> {
        self.inner.put_user(user).await
    }

    async fn get_hospital(&self, id: &str) -> AccessResult<Option<Hospital>> {
        self.inner.get_hospital(id).await
    }

    async fn put_hospital(&self, hospital: Hospital) -> AccessResult<()> {
        self.inner.put_hospital(hospital).await
    }
}

pub struct Harness {
    pub engine: AccessControlEngine,
    pub clock: ManualClock,
    /// What the engine writes through; lets a test take the audit log down.
    pub outage: Arc<AuditOutageStorage>,
    pub storage: Arc<InMemoryStorage>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn test_config() -> AccessControlConfig {
    AccessControlConfig {
        expose_code_in_response: true,
        ..Default::default()
    }
}

pub async fn harness() -> Harness {
    harness_with(test_config()).await
}

pub async fn harness_with(config: AccessControlConfig) -> Harness {
    let mailer = Arc::new(RecordingMailer::default());
    harness_with_mailer(config, mailer.clone(), mailer).await
}

pub async fn harness_with_mailer(
    config: AccessControlConfig,
    mailer: Arc<dyn Mailer>,
    recorder: Arc<RecordingMailer>,
) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = ManualClock::new(start_time());
    let storage = Arc::new(InMemoryStorage::new());
    let outage = Arc::new(AuditOutageStorage::new(storage.clone()));
    let engine = AccessControlEngine::new(config, outage.clone(), Arc::new(clock.clone()), mailer);
    seed_directory(&engine).await;
    Harness {
        engine,
        clock,
        outage,
        storage,
        mailer: recorder,
    }
}

async fn seed_directory(engine: &AccessControlEngine) {
    let users = [
        UserProfile::new(PATIENT, "Pat Doe", "pat@example.org", Role::Patient),
        UserProfile::new(OTHER_PATIENT, "Quinn Roe", "quinn@example.org", Role::Patient),
        UserProfile::new(DOCTOR_A, "Ada Okafor", "ada@hospital.example", Role::Doctor).at_hospital(HOSPITAL),
        UserProfile::new(DOCTOR_B, "Ben Mensah", "ben@hospital.example", Role::Doctor).at_hospital(HOSPITAL),
        UserProfile::new(ADMIN, "Facility Admin", "admin@hospital.example", Role::Admin).at_hospital(HOSPITAL),
    ];
    for user in users {
        engine.directory.register_user(user).await.unwrap();
    }
    engine
        .directory
        .register_hospital(Hospital {
            id: HOSPITAL.into(),
            name: "St. Example General".into(),
            admin_user_id: Some(ADMIN.into()),
        })
        .await
        .unwrap();
}

pub fn doctor(id: &str) -> ActorContext {
    ActorContext::doctor(id).with_origin(Some("10.0.0.7".into()), Some("ward-terminal/2.1".into()))
}

pub fn patient(id: &str) -> ActorContext {
    ActorContext::patient(id)
}

pub fn admin() -> ActorContext {
    ActorContext::admin(ADMIN)
}

pub async fn audit_for(h: &Harness, patient_id: &str) -> Vec<AuditLogEntry> {
    h.storage
        .find_audit_entries(&AuditFilter::for_patient(patient_id).unbounded())
        .await
        .unwrap()
}

pub async fn audit_count(h: &Harness) -> usize {
    h.storage
        .count_audit_entries(&AuditFilter::default())
        .await
        .unwrap()
}
