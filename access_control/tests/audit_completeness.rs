// access_control/tests/audit_completeness.rs
//! Every state-changing call, granted or denied, leaves exactly one entry.
mod common;

use chrono::Duration;

use access_control::{AccessControlEngine, NewConsentRequest};
use common::*;
use lib::clock::Clock;
use lib::config::AccessControlConfig;
use models::medical::{AccessType, AuditAction, ConsentDecision, ObservationKind, ObservationRecord, RequestType};

async fn expect_one_entry(h: &Harness, before: usize, access_type: AccessType, action: AuditAction) -> usize {
    let entries = audit_for(h, PATIENT).await;
    assert_eq!(entries.len(), before + 1, "expected exactly one new entry");
    assert_eq!(entries[0].access_type, access_type);
    assert_eq!(entries[0].action, action);
    entries.len()
}

#[tokio::test]
async fn should_write_exactly_one_entry_per_state_change() {
    let h = harness().await;
    let doc = doctor(DOCTOR_A);
    let mut seen = 0;

    let request = h
        .engine
        .consent
        .create(
            &doc,
            NewConsentRequest {
                patient_id: PATIENT.into(),
                hospital_id: HOSPITAL.into(),
                request_type: RequestType::Edit,
                reason: "Update discharge notes".into(),
                requested_data: vec!["medical_history".into()],
                expires_in_hours: Some(6),
            },
        )
        .await
        .unwrap();
    seen = expect_one_entry(&h, seen, AccessType::Consent, AuditAction::Create).await;

    h.engine
        .consent
        .respond(&patient(PATIENT), &request.id, ConsentDecision::Approved, None)
        .await
        .unwrap();
    seen = expect_one_entry(&h, seen, AccessType::Consent, AuditAction::Update).await;

    let code = h.engine.otp.request_code(&doc, PATIENT).await.unwrap().code.unwrap();
    seen = expect_one_entry(&h, seen, AccessType::Consent, AuditAction::Create).await;

    let wrong = if code == "000000" { "111111" } else { "000000" };
    assert!(h.engine.otp.verify_code(&doc, PATIENT, wrong).await.is_err());
    seen = expect_one_entry(&h, seen, AccessType::Consent, AuditAction::View).await;

    h.engine.otp.verify_code(&doc, PATIENT, &code).await.unwrap();
    seen = expect_one_entry(&h, seen, AccessType::Consent, AuditAction::View).await;
    assert!(audit_for(&h, PATIENT).await[0].otp_verified);

    h.engine.otp.request_code(&doc, PATIENT).await.unwrap();
    seen = expect_one_entry(&h, seen, AccessType::Consent, AuditAction::Create).await;
    h.clock.advance(Duration::minutes(15));
    let stale = h.engine.otp.request_code(&doctor(DOCTOR_B), PATIENT).await.unwrap();
    seen = expect_one_entry(&h, seen, AccessType::Consent, AuditAction::Create).await;
    assert!(!stale.reused);

    h.engine.emergency.grant(&doc, PATIENT, "Cardiac arrest in triage, history unavailable", None).await.unwrap();
    seen = expect_one_entry(&h, seen, AccessType::Emergency, AuditAction::View).await;

    h.engine.emergency.record_emergency_read(&doc, PATIENT, "cardiology notes").await.unwrap();
    seen = expect_one_entry(&h, seen, AccessType::Emergency, AuditAction::View).await;

    let record = ObservationRecord::new(PATIENT, ObservationKind::Condition).synced_at(h.clock.now());
    let id = record.id;
    h.engine.observations.register_observation(record).await.unwrap();
    h.engine.observations.authorize_edit(&doc, &id).await.unwrap();
    seen = expect_one_entry(&h, seen, AccessType::Regular, AuditAction::Update).await;

    h.engine.otp.invalidate_codes(&patient(PATIENT), PATIENT).await.unwrap();
    expect_one_entry(&h, seen, AccessType::Consent, AuditAction::Delete).await;
}

#[tokio::test]
async fn should_page_patient_audit_newest_first() {
    let h = harness().await;
    for minutes in 0..5 {
        h.clock.set(start_time() + Duration::minutes(minutes));
        h.engine.otp.request_code(&doctor(DOCTOR_A), PATIENT).await.unwrap();
        h.engine.otp.invalidate_codes(&patient(PATIENT), PATIENT).await.unwrap();
    }

    let page = h.engine.audit.for_patient(PATIENT, 3, 1).await.unwrap();
    assert_eq!(page.total, 10);
    assert_eq!(page.entries.len(), 3);
    assert_eq!(page.entries[0].action, AuditAction::Create);
    assert_eq!(page.entries[0].access_time, start_time() + Duration::minutes(4));
    assert!(page.entries.windows(2).all(|w| w[0].access_time >= w[1].access_time));
}

#[tokio::test]
async fn should_expose_engine_through_global_handle() {
    assert!(AccessControlEngine::get().await.is_err());
    let engine = AccessControlEngine::from_config(AccessControlConfig::default()).unwrap();
    AccessControlEngine::global_init(engine).await.unwrap();

    let global = AccessControlEngine::get().await.unwrap();
    assert_eq!(global.config.otp_max_attempts, 3);
    assert_eq!(global.pending_notifications(), 0);

    let second = AccessControlEngine::from_config(AccessControlConfig::default()).unwrap();
    assert!(AccessControlEngine::global_init(second).await.is_err());
}
