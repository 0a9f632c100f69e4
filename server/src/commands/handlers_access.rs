// server/src/commands/handlers_access.rs
use anyhow::Result;
use serde_json::json;

use access_control::AccessControlEngine;

pub async fn handle_consent_check(engine: &AccessControlEngine, doctor_id: &str, patient_id: &str, json: bool) -> Result<()> {
    let grant = engine
        .consent
        .active_grant(doctor_id, patient_id)
        .await?;
    if json {
        let body = json!({
            "doctorId": doctor_id,
            "patientId": patient_id,
            "hasAccess": grant.is_some(),
            "expiresAt": grant.as_ref().map(|g| g.expires_at),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }
    match grant {
        Some(request) => println!(
            "GRANTED: {} may access {} until {} (request {})",
            doctor_id,
            patient_id,
            request.expires_at.to_rfc3339(),
            request.id
        ),
        None => println!("DENIED: no approved, unexpired consent for {} on {}", doctor_id, patient_id),
    }
    Ok(())
}

pub async fn handle_emergency_check(engine: &AccessControlEngine, doctor_id: &str, patient_id: &str, json: bool) -> Result<()> {
    let valid = engine
        .emergency
        .is_valid_for_read(doctor_id, patient_id)
        .await?;
    if json {
        let body = json!({ "doctorId": doctor_id, "patientId": patient_id, "valid": valid });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else if valid {
        println!("VALID: {} holds emergency access to {}", doctor_id, patient_id);
    } else {
        println!("EXPIRED: {} holds no valid emergency access to {}", doctor_id, patient_id);
    }
    Ok(())
}
