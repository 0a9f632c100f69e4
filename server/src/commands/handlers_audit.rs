// server/src/commands/handlers_audit.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

use access_control::AccessControlEngine;
use models::medical::EmergencyOverrideFilter;
use models::ActorContext;

const OPERATOR_ID: &str = "cli-operator";

pub async fn handle_audit_command(
    engine: &AccessControlEngine,
    patient_id: &str,
    limit: usize,
    offset: usize,
    json: bool,
) -> Result<()> {
    let page = engine
        .audit
        .for_patient(patient_id, limit, offset)
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }
    println!(
        "Audit trail for {} ({} of {} entries, offset {})",
        patient_id,
        page.entries.len(),
        page.total,
        page.offset
    );
    for entry in &page.entries {
        println!(
            "{}  {:<9} {:<6} {:<16} {}{}",
            entry.access_time.to_rfc3339(),
            entry.access_type,
            entry.action,
            entry.actor_id,
            entry.details,
            if entry.otp_verified { "  [otp]" } else { "" }
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_overrides_command(
    engine: &AccessControlEngine,
    doctor_id: Option<String>,
    patient_id: Option<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    limit: usize,
    offset: usize,
    json: bool,
) -> Result<()> {
    let filter = EmergencyOverrideFilter {
        since,
        until,
        doctor_id,
        patient_id,
        limit,
        offset,
    };
    let operator = ActorContext::admin(OPERATOR_ID);
    let page = engine
        .emergency
        .list_overrides(&operator, &filter)
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }
    println!("Emergency overrides ({} of {})", page.overrides.len(), page.total);
    for record in &page.overrides {
        println!(
            "{}  doctor={} patient={} hospital={} :: {}",
            record.access_time.to_rfc3339(),
            record.doctor_user_id,
            record.patient_id,
            record.hospital_id.as_deref().unwrap_or("-"),
            record.justification
        );
    }
    Ok(())
}
