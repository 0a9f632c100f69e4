// access_control/tests/consent_flow.rs
mod common;

use chrono::Duration;

use access_control::NewConsentRequest;
use common::*;
use lib::storage_engine::ConsentRequestStore;
use models::errors::AccessError;
use models::medical::{
    AccessType, AuditAction, ConsentDecision, ConsentStatus, DataCategory, NotificationType, Priority, RequestType,
};

fn medications_request(hours: Option<i64>) -> NewConsentRequest {
    NewConsentRequest {
        patient_id: PATIENT.into(),
        hospital_id: HOSPITAL.into(),
        request_type: RequestType::View,
        reason: "Annual check".into(),
        requested_data: vec!["medications".into()],
        expires_in_hours: hours,
    }
}

#[tokio::test]
async fn should_walk_request_through_approval() {
    let h = harness().await;
    let now = start_time();

    let request = h.engine.consent.create(&doctor(DOCTOR_A), medications_request(None)).await.unwrap();
    assert_eq!(request.status, ConsentStatus::Pending);
    assert_eq!(request.expires_at, now + Duration::hours(24));
    assert!(request.requested_data.contains(&DataCategory::Medications));
    assert!(!h.engine.consent.check_access(DOCTOR_A, PATIENT).await.unwrap());

    h.clock.advance(Duration::minutes(30));
    let approved = h
        .engine
        .consent
        .respond(&patient(PATIENT), &request.id, ConsentDecision::Approved, Some("Go ahead"))
        .await
        .unwrap();
    assert_eq!(approved.status, ConsentStatus::Approved);
    assert_eq!(approved.approved_at, Some(now + Duration::minutes(30)));
    assert_eq!(approved.patient_response_reason.as_deref(), Some("Go ahead"));
    assert!(h.engine.consent.check_access(DOCTOR_A, PATIENT).await.unwrap());
    assert!(!h.engine.consent.check_access(DOCTOR_B, PATIENT).await.unwrap());
    let grant = h.engine.consent.active_grant(DOCTOR_A, PATIENT).await.unwrap().unwrap();
    assert_eq!(grant.id, request.id);

    let entries = audit_for(&h, PATIENT).await;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.access_type == AccessType::Consent));
    assert_eq!(entries[0].action, AuditAction::Update);
    assert_eq!(entries[1].action, AuditAction::Create);

    let err = h
        .engine
        .consent
        .respond(&patient(PATIENT), &request.id, ConsentDecision::Denied, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::InvalidState(_)));
    assert_eq!(audit_for(&h, PATIENT).await.len(), 2);
}

#[tokio::test]
async fn should_observe_expiry_without_any_write() {
    let h = harness().await;
    let request = h.engine.consent.create(&doctor(DOCTOR_A), medications_request(Some(1))).await.unwrap();

    h.clock.advance(Duration::hours(2));
    let seen = h.engine.consent.get_request(&patient(PATIENT), &request.id).await.unwrap();
    assert_eq!(seen.status, ConsentStatus::Expired);

    let stored = h.storage.get_consent_request(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ConsentStatus::Pending);

    assert!(h.engine.consent.pending_for_patient(PATIENT).await.unwrap().is_empty());
    let by_doctor = h.engine.consent.by_doctor(DOCTOR_A).await.unwrap();
    assert_eq!(by_doctor.len(), 1);
    assert_eq!(by_doctor[0].status, ConsentStatus::Expired);
}

#[tokio::test]
async fn should_persist_expiry_when_patient_answers_late() {
    let h = harness().await;
    let request = h.engine.consent.create(&doctor(DOCTOR_A), medications_request(Some(1))).await.unwrap();

    h.clock.advance(Duration::hours(2));
    let err = h
        .engine
        .consent
        .respond(&patient(PATIENT), &request.id, ConsentDecision::Approved, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Expired(_)));

    let stored = h.storage.get_consent_request(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ConsentStatus::Expired);
    assert!(stored.approved_at.is_none());
    assert!(!h.engine.consent.check_access(DOCTOR_A, PATIENT).await.unwrap());

    let actions: Vec<_> = audit_for(&h, PATIENT).await.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Update, AuditAction::Create]);
}

#[tokio::test]
async fn should_describe_expiry_of_an_answered_request() {
    let h = harness().await;
    let request = h.engine.consent.create(&doctor(DOCTOR_A), medications_request(Some(1))).await.unwrap();
    h.engine
        .consent
        .respond(&patient(PATIENT), &request.id, ConsentDecision::Approved, None)
        .await
        .unwrap();

    h.clock.advance(Duration::hours(2));
    let err = h
        .engine
        .consent
        .respond(&patient(PATIENT), &request.id, ConsentDecision::Denied, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Expired(_)));

    let stored = h.storage.get_consent_request(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ConsentStatus::Expired);
    assert!(stored.approved_at.is_some());

    let latest = &audit_for(&h, PATIENT).await[0];
    assert_eq!(latest.action, AuditAction::Update);
    assert!(latest.details.contains("after being approved"));
    assert!(!latest.details.contains("before the patient responded"));
}

#[tokio::test]
async fn should_stop_granting_access_once_approval_lapses() {
    let h = harness().await;
    let request = h.engine.consent.create(&doctor(DOCTOR_A), medications_request(Some(3))).await.unwrap();
    h.engine
        .consent
        .respond(&patient(PATIENT), &request.id, ConsentDecision::Approved, None)
        .await
        .unwrap();
    assert!(h.engine.consent.check_access(DOCTOR_A, PATIENT).await.unwrap());

    h.clock.advance(Duration::hours(3) + Duration::seconds(1));
    assert!(!h.engine.consent.check_access(DOCTOR_A, PATIENT).await.unwrap());
}

#[tokio::test]
async fn should_reject_malformed_requests_before_writing() {
    let h = harness().await;
    let actor = doctor(DOCTOR_A);

    let short = NewConsentRequest {
        reason: "   too short   ".into(),
        ..medications_request(None)
    };
    assert!(matches!(h.engine.consent.create(&actor, short).await, Err(AccessError::Validation(_))));

    let empty = NewConsentRequest {
        requested_data: vec![],
        ..medications_request(None)
    };
    assert!(matches!(h.engine.consent.create(&actor, empty).await, Err(AccessError::Validation(_))));

    let unknown = NewConsentRequest {
        requested_data: vec!["medications".into(), "dreams".into()],
        ..medications_request(None)
    };
    assert!(matches!(h.engine.consent.create(&actor, unknown).await, Err(AccessError::Validation(_))));

    for hours in [0, -4, 721] {
        let result = h.engine.consent.create(&actor, medications_request(Some(hours))).await;
        assert!(matches!(result, Err(AccessError::Validation(_))), "hours {}", hours);
    }

    let no_hospital = NewConsentRequest {
        hospital_id: "hosp-missing".into(),
        ..medications_request(None)
    };
    assert!(matches!(h.engine.consent.create(&actor, no_hospital).await, Err(AccessError::NotFound(_))));

    let by_patient = h.engine.consent.create(&patient(PATIENT), medications_request(None)).await;
    assert!(matches!(by_patient, Err(AccessError::Forbidden(_))));

    assert_eq!(audit_count(&h).await, 0);
    assert!(h.engine.consent.by_doctor(DOCTOR_A).await.unwrap().is_empty());
}

#[tokio::test]
async fn should_default_emergency_requests_to_two_hours() {
    let h = harness().await;
    let input = NewConsentRequest {
        request_type: RequestType::Emergency,
        reason: "Suspected anaphylaxis on arrival".into(),
        requested_data: vec!["allergies".into(), "medications".into()],
        ..medications_request(None)
    };
    let request = h.engine.consent.create(&doctor(DOCTOR_A), input).await.unwrap();
    assert_eq!(request.expires_at, start_time() + Duration::hours(2));

    h.engine.wait_for_notifications().await;
    let inbox = h.engine.inbox.unread(&patient(PATIENT)).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].notification_type, NotificationType::AccessRequest);
    assert_eq!(inbox[0].priority, Priority::Urgent);
    assert_eq!(inbox[0].expires_at, Some(start_time() + Duration::hours(2)));
}

#[tokio::test]
async fn should_refresh_live_pending_request_in_place() {
    let h = harness().await;
    let first = h.engine.consent.create(&doctor(DOCTOR_A), medications_request(Some(4))).await.unwrap();

    h.clock.advance(Duration::hours(1));
    let input = NewConsentRequest {
        reason: "Follow-up on lab work".into(),
        requested_data: vec!["lab_results".into()],
        ..medications_request(None)
    };
    let second = h.engine.consent.create(&doctor(DOCTOR_A), input).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.reason, "Follow-up on lab work");
    assert_eq!(second.expires_at, start_time() + Duration::hours(25));
    assert_eq!(h.engine.consent.pending_for_patient(PATIENT).await.unwrap().len(), 1);

    let actions: Vec<_> = audit_for(&h, PATIENT).await.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Update, AuditAction::Create]);
}

#[tokio::test]
async fn should_only_let_owning_patient_respond() {
    let h = harness().await;
    let request = h.engine.consent.create(&doctor(DOCTOR_A), medications_request(None)).await.unwrap();

    let err = h
        .engine
        .consent
        .respond(&patient(OTHER_PATIENT), &request.id, ConsentDecision::Approved, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Forbidden(_)));

    let err = h.engine.consent.get_request(&patient(OTHER_PATIENT), &request.id).await.unwrap_err();
    assert!(matches!(err, AccessError::NotFound(_)));

    let err = h
        .engine
        .consent
        .respond(&patient(PATIENT), &uuid::Uuid::new_v4(), ConsentDecision::Approved, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::NotFound(_)));

    let too_long = "n".repeat(501);
    let err = h
        .engine
        .consent
        .respond(&patient(PATIENT), &request.id, ConsentDecision::Denied, Some(&too_long))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Validation(_)));

    let stored = h.storage.get_consent_request(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ConsentStatus::Pending);
    assert_eq!(audit_for(&h, PATIENT).await.len(), 1);
}

#[tokio::test]
async fn should_tell_doctor_about_denial() {
    let h = harness().await;
    let request = h.engine.consent.create(&doctor(DOCTOR_A), medications_request(None)).await.unwrap();
    h.engine
        .consent
        .respond(&patient(PATIENT), &request.id, ConsentDecision::Denied, Some("Not my doctor"))
        .await
        .unwrap();

    h.engine.wait_for_notifications().await;
    let inbox = h.engine.inbox.unread(&doctor(DOCTOR_A)).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].notification_type, NotificationType::AccessDenied);
    assert_eq!(inbox[0].priority, Priority::Medium);

    let recipients: Vec<_> = h.mailer.sent().into_iter().map(|m| m.to).collect();
    assert_eq!(recipients, vec!["pat@example.org".to_string(), "ada@hospital.example".to_string()]);

    let read = h.engine.inbox.mark_read(&doctor(DOCTOR_A), &inbox[0].id).await.unwrap();
    assert!(read.is_read);
    assert!(h.engine.inbox.unread(&doctor(DOCTOR_A)).await.unwrap().is_empty());

    let err = h.engine.inbox.mark_read(&patient(PATIENT), &inbox[0].id).await.unwrap_err();
    assert!(matches!(err, AccessError::Forbidden(_)));
}
