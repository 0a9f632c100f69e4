// lib/src/config/config_defaults.rs
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH_RELATIVE: &str = "./config/access_control.yaml";
pub const CONFIG_PATH_ENV_VAR: &str = "PASSPORT_ACCESS_CONFIG";
pub const DEFAULT_STORAGE_PATH: &str = "./passport_access_db";

pub const REASON_MIN_CHARS: usize = 10;
pub const REASON_MAX_CHARS: usize = 500;
pub const JUSTIFICATION_MIN_CHARS: usize = 20;
pub const JUSTIFICATION_MAX_CHARS: usize = 500;
pub const RESPONSE_REASON_MAX_CHARS: usize = 500;

pub fn default_storage_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_PATH)
}

pub fn default_otp_ttl_secs() -> i64 {
    10 * 60
}

pub fn default_otp_max_attempts() -> u32 {
    3
}

pub fn default_otp_code_length() -> u32 {
    6
}

pub fn default_otp_grant_secs() -> i64 {
    60 * 60
}

pub fn default_allow_concurrent_codes() -> bool {
    true
}

pub fn default_consent_default_hours() -> i64 {
    24
}

pub fn default_consent_emergency_hours() -> i64 {
    2
}

pub fn default_consent_max_hours() -> i64 {
    24 * 30
}

pub fn default_emergency_validity_secs() -> i64 {
    2 * 60 * 60
}

pub fn default_sync_edit_window_secs() -> i64 {
    3 * 60 * 60
}

pub fn default_medication_active_secs() -> i64 {
    2 * 60 * 60
}

pub fn default_urgent_notification_ttl_secs() -> i64 {
    2 * 60 * 60
}

pub fn default_notification_queue_capacity() -> usize {
    256
}

pub fn default_directory_cache_ttl_secs() -> u64 {
    60
}

pub fn default_directory_cache_capacity() -> u64 {
    10_000
}
