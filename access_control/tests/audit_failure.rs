// access_control/tests/audit_failure.rs
//! A decision whose audit entry cannot be written must not take effect.
mod common;

use chrono::Duration;

use access_control::NewConsentRequest;
use common::*;
use lib::storage_engine::{ConsentRequestStore, EmergencyOverrideStore, ObservationStore, OneTimeCodeStore};
use models::errors::AccessError;
use models::medical::{
    ConsentDecision, ConsentStatus, EmergencyOverrideFilter, ObservationKind, ObservationRecord, RequestType,
};

const JUSTIFICATION: &str = "Patient unconscious, need allergy history for anesthesia";

fn request_input() -> NewConsentRequest {
    NewConsentRequest {
        patient_id: PATIENT.into(),
        hospital_id: HOSPITAL.into(),
        request_type: RequestType::View,
        reason: "Review recent labs".into(),
        requested_data: vec!["lab_results".into()],
        expires_in_hours: None,
    }
}

#[tokio::test]
async fn should_not_store_emergency_override_without_audit_entry() {
    let h = harness().await;
    h.outage.set_audit_down(true);

    let err = h.engine.emergency.grant(&doctor(DOCTOR_A), PATIENT, JUSTIFICATION, None).await.unwrap_err();
    assert!(matches!(err, AccessError::StorageError(_)));
    assert!(!h.engine.emergency.is_valid_for_read(DOCTOR_A, PATIENT).await.unwrap());
    let filter = EmergencyOverrideFilter::for_patient(PATIENT);
    assert_eq!(h.storage.count_emergency_overrides(&filter).await.unwrap(), 0);

    h.outage.set_audit_down(false);
    h.engine.emergency.grant(&doctor(DOCTOR_A), PATIENT, JUSTIFICATION, None).await.unwrap();
    assert!(h.engine.emergency.is_valid_for_read(DOCTOR_A, PATIENT).await.unwrap());
    assert_eq!(audit_count(&h).await, 1);
}

#[tokio::test]
async fn should_withdraw_new_code_when_issuance_cannot_be_audited() {
    let h = harness().await;
    h.outage.set_audit_down(true);

    assert!(h.engine.otp.request_code(&doctor(DOCTOR_A), PATIENT).await.is_err());
    assert!(h.storage.get_code_slot(PATIENT).await.unwrap().is_none());

    h.outage.set_audit_down(false);
    let issued = h.engine.otp.request_code(&doctor(DOCTOR_A), PATIENT).await.unwrap();
    assert!(!issued.reused);
    assert_eq!(audit_count(&h).await, 1);
}

#[tokio::test]
async fn should_keep_code_usable_when_verification_cannot_be_audited() {
    let h = harness().await;
    let code = h.engine.otp.request_code(&doctor(DOCTOR_A), PATIENT).await.unwrap().code.unwrap();
    h.clock.advance(Duration::minutes(2));

    h.outage.set_audit_down(true);
    assert!(h.engine.otp.verify_code(&doctor(DOCTOR_A), PATIENT, &code).await.is_err());
    let slot = h.storage.get_code_slot(PATIENT).await.unwrap().unwrap();
    assert_eq!(slot.codes.len(), 1);
    assert_eq!(slot.codes[0].code, code);

    h.outage.set_audit_down(false);
    assert!(h.engine.otp.verify_code(&doctor(DOCTOR_A), PATIENT, &code).await.is_ok());
    assert!(h.storage.get_code_slot(PATIENT).await.unwrap().is_none());
}

#[tokio::test]
async fn should_not_count_mismatch_that_was_not_audited() {
    let h = harness().await;
    let code = h.engine.otp.request_code(&doctor(DOCTOR_A), PATIENT).await.unwrap().code.unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    h.outage.set_audit_down(true);
    let err = h.engine.otp.verify_code(&doctor(DOCTOR_A), PATIENT, wrong).await.unwrap_err();
    assert!(matches!(err, AccessError::StorageError(_)));
    let slot = h.storage.get_code_slot(PATIENT).await.unwrap().unwrap();
    assert_eq!(slot.attempts_by(DOCTOR_A), 0);
}

#[tokio::test]
async fn should_remove_consent_request_when_creation_cannot_be_audited() {
    let h = harness().await;
    h.outage.set_audit_down(true);

    assert!(h.engine.consent.create(&doctor(DOCTOR_A), request_input()).await.is_err());
    assert!(h.engine.consent.by_doctor(DOCTOR_A).await.unwrap().is_empty());
}

#[tokio::test]
async fn should_leave_request_pending_when_answer_cannot_be_audited() {
    let h = harness().await;
    let request = h.engine.consent.create(&doctor(DOCTOR_A), request_input()).await.unwrap();

    h.outage.set_audit_down(true);
    let result = h
        .engine
        .consent
        .respond(&patient(PATIENT), &request.id, ConsentDecision::Approved, None)
        .await;
    assert!(result.is_err());
    let stored = h.storage.get_consent_request(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ConsentStatus::Pending);
    assert!(!h.engine.consent.check_access(DOCTOR_A, PATIENT).await.unwrap());

    h.outage.set_audit_down(false);
    h.engine
        .consent
        .respond(&patient(PATIENT), &request.id, ConsentDecision::Approved, None)
        .await
        .unwrap();
    assert!(h.engine.consent.check_access(DOCTOR_A, PATIENT).await.unwrap());
}

#[tokio::test]
async fn should_not_widen_allow_list_when_edit_cannot_be_audited() {
    let h = harness().await;
    let record = ObservationRecord::new(PATIENT, ObservationKind::Condition).synced_at(start_time());
    let id = record.id;
    h.engine.observations.register_observation(record).await.unwrap();

    h.outage.set_audit_down(true);
    assert!(h.engine.observations.authorize_edit(&doctor(DOCTOR_A), &id).await.is_err());
    let stored = h.storage.get_observation(&id).await.unwrap().unwrap();
    assert!(stored.editable_by.is_empty());
    assert!(stored.last_edited_at.is_none());
}
