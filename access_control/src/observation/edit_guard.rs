// access_control/src/observation/edit_guard.rs
//! Pure edit-window predicate over (sync date, allow-list, clinician, now).
use chrono::{DateTime, Duration, Utc};

use lib::config::AccessControlConfig;
use models::medical::{EditAccessInfo, EditWindow, MedicationStatus, ObservationKind, ObservationRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditWindowPolicy {
    pub sync_window: Duration,
    pub medication_active_window: Duration,
}

impl Default for EditWindowPolicy {
    fn default() -> Self {
        EditWindowPolicy::from_config(&AccessControlConfig::default())
    }
}

impl EditWindowPolicy {
    pub fn from_config(config: &AccessControlConfig) -> Self {
        EditWindowPolicy {
            sync_window: config.sync_edit_window(),
            medication_active_window: config.medication_active_window(),
        }
    }

    pub fn window_at(&self, record: &ObservationRecord, now: DateTime<Utc>) -> EditWindow {
        match record.sync_date {
            None => EditWindow::NotSynced,
            Some(synced) if now - synced <= self.sync_window => EditWindow::Open,
            Some(_) => EditWindow::Locked,
        }
    }

    /// `Active` shortly after sync, `Past` afterwards. Only medications carry one.
    pub fn medication_status_at(&self, record: &ObservationRecord, now: DateTime<Utc>) -> Option<MedicationStatus> {
        if record.kind != ObservationKind::Medication {
            return None;
        }
        match record.sync_date {
            Some(synced) if now - synced < self.medication_active_window => Some(MedicationStatus::Active),
            Some(_) => Some(MedicationStatus::Past),
            None => record.medication_status,
        }
    }
}

pub fn can_edit(record: &ObservationRecord, clinician_id: &str, now: DateTime<Utc>, policy: &EditWindowPolicy) -> bool {
    if clinician_id.trim().is_empty() {
        return false;
    }
    match policy.window_at(record, now) {
        EditWindow::NotSynced | EditWindow::Open => true,
        EditWindow::Locked => record.is_allow_listed(clinician_id),
    }
}

/// Richer answer than `can_edit`, used for precise denial messages.
pub fn check_edit_access(
    record: &ObservationRecord,
    now: DateTime<Utc>,
    policy: &EditWindowPolicy,
    clinician_id: Option<&str>,
) -> EditAccessInfo {
    let window = policy.window_at(record, now);
    let hours_since_sync = record
        .sync_date
        .map(|synced| (now - synced).num_seconds() as f64 / 3600.0);
    let window_hours = policy.sync_window.num_minutes() as f64 / 60.0;
    let reason = match window {
        EditWindow::NotSynced => "Record was not synced from an external system; any clinician may edit".to_string(),
        EditWindow::Open => format!(
            "Synced {:.1} hours ago; any clinician may edit within {} hours of sync",
            hours_since_sync.unwrap_or_default(),
            window_hours
        ),
        EditWindow::Locked => format!(
            "Edit window closed {:.1} hours after sync; only clinicians who already edited this record may edit it",
            hours_since_sync.unwrap_or_default()
        ),
    };
    EditAccessInfo {
        window,
        open_to_all: window != EditWindow::Locked,
        can_edit: clinician_id.map(|id| can_edit(record, id, now, policy)),
        hours_since_sync,
        medication_status: policy.medication_status_at(record, now),
        reason,
        sync_date: record.sync_date,
        editable_by: record.editable_by.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn synced_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn synced_record() -> ObservationRecord {
        ObservationRecord::new("p-1", ObservationKind::Condition).synced_at(synced_at())
    }

    #[test]
    fn should_let_anyone_edit_unsynced_records() {
        let policy = EditWindowPolicy::default();
        let record = ObservationRecord::new("p-1", ObservationKind::Visit);
        let far_future = synced_at() + Duration::days(400);
        assert!(can_edit(&record, "doc-y", far_future, &policy));
        assert_eq!(policy.window_at(&record, far_future), EditWindow::NotSynced);
    }

    #[test]
    fn should_open_window_for_three_hours_after_sync() {
        let policy = EditWindowPolicy::default();
        let record = synced_record();
        assert!(can_edit(&record, "doc-y", synced_at() + Duration::hours(1), &policy));
        assert!(can_edit(&record, "doc-y", synced_at() + Duration::hours(3), &policy));
        assert!(!can_edit(&record, "doc-y", synced_at() + Duration::hours(4), &policy));
    }

    #[test]
    fn should_keep_allow_listed_clinicians_after_window() {
        let policy = EditWindowPolicy::default();
        let mut record = synced_record();
        record.add_editor("doc-x");
        let late = synced_at() + Duration::hours(5);
        assert!(can_edit(&record, "doc-x", late, &policy));
        assert!(!can_edit(&record, "doc-y", late, &policy));
    }

    #[test]
    fn should_never_allow_blank_clinician() {
        let policy = EditWindowPolicy::default();
        let record = ObservationRecord::new("p-1", ObservationKind::Test);
        assert!(!can_edit(&record, "  ", synced_at(), &policy));
    }

    #[test]
    fn should_report_locked_window_with_hours() {
        let policy = EditWindowPolicy::default();
        let info = check_edit_access(&synced_record(), synced_at() + Duration::hours(4), &policy, Some("doc-y"));
        assert_eq!(info.window, EditWindow::Locked);
        assert!(!info.open_to_all);
        assert_eq!(info.can_edit, Some(false));
        assert_eq!(info.hours_since_sync, Some(4.0));
        assert!(info.reason.contains("closed"));
    }

    #[test]
    fn should_flip_medication_to_past_after_two_hours() {
        let policy = EditWindowPolicy::default();
        let record = ObservationRecord::new("p-1", ObservationKind::Medication).synced_at(synced_at());
        assert_eq!(
            policy.medication_status_at(&record, synced_at() + Duration::minutes(90)),
            Some(MedicationStatus::Active)
        );
        assert_eq!(
            policy.medication_status_at(&record, synced_at() + Duration::hours(2)),
            Some(MedicationStatus::Past)
        );
        assert_eq!(policy.medication_status_at(&synced_record(), synced_at()), None);
    }
}
