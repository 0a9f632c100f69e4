// lib/src/config/config_structs.rs
use std::path::PathBuf;
use chrono::Duration;
use serde::{Serialize, Deserialize};

use crate::config::config_defaults::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageEngineType {
    InMemory,
    Sled,
}

impl Default for StorageEngineType {
    fn default() -> Self {
        StorageEngineType::InMemory
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub engine: StorageEngineType,
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// Sled only: discard the database when the handle drops.
    #[serde(default)]
    pub temporary: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            engine: StorageEngineType::default(),
            path: default_storage_path(),
            temporary: false,
        }
    }
}

/// Tunables for every time window and limit the engines enforce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessControlConfig {
    #[serde(default = "default_otp_ttl_secs")]
    pub otp_ttl_secs: i64,
    #[serde(default = "default_otp_max_attempts")]
    pub otp_max_attempts: u32,
    #[serde(default = "default_otp_code_length")]
    pub otp_code_length: u32,
    #[serde(default = "default_otp_grant_secs")]
    pub otp_grant_secs: i64,
    #[serde(default = "default_allow_concurrent_codes")]
    pub allow_concurrent_codes: bool,
    #[serde(default)]
    pub expose_code_in_response: bool,
    #[serde(default = "default_consent_default_hours")]
    pub consent_default_hours: i64,
    #[serde(default = "default_consent_emergency_hours")]
    pub consent_emergency_hours: i64,
    #[serde(default = "default_consent_max_hours")]
    pub consent_max_hours: i64,
    #[serde(default = "default_emergency_validity_secs")]
    pub emergency_validity_secs: i64,
    #[serde(default = "default_sync_edit_window_secs")]
    pub sync_edit_window_secs: i64,
    #[serde(default = "default_medication_active_secs")]
    pub medication_active_secs: i64,
    #[serde(default = "default_urgent_notification_ttl_secs")]
    pub urgent_notification_ttl_secs: i64,
    #[serde(default = "default_notification_queue_capacity")]
    pub notification_queue_capacity: usize,
    #[serde(default = "default_directory_cache_ttl_secs")]
    pub directory_cache_ttl_secs: u64,
    #[serde(default = "default_directory_cache_capacity")]
    pub directory_cache_capacity: u64,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        AccessControlConfig {
            otp_ttl_secs: default_otp_ttl_secs(),
            otp_max_attempts: default_otp_max_attempts(),
            otp_code_length: default_otp_code_length(),
            otp_grant_secs: default_otp_grant_secs(),
            allow_concurrent_codes: default_allow_concurrent_codes(),
            expose_code_in_response: false,
            consent_default_hours: default_consent_default_hours(),
            consent_emergency_hours: default_consent_emergency_hours(),
            consent_max_hours: default_consent_max_hours(),
            emergency_validity_secs: default_emergency_validity_secs(),
            sync_edit_window_secs: default_sync_edit_window_secs(),
            medication_active_secs: default_medication_active_secs(),
            urgent_notification_ttl_secs: default_urgent_notification_ttl_secs(),
            notification_queue_capacity: default_notification_queue_capacity(),
            directory_cache_ttl_secs: default_directory_cache_ttl_secs(),
            directory_cache_capacity: default_directory_cache_capacity(),
            storage: StorageConfig::default(),
        }
    }
}

impl AccessControlConfig {
    pub fn otp_ttl(&self) -> Duration {
        Duration::seconds(self.otp_ttl_secs)
    }

    pub fn otp_grant(&self) -> Duration {
        Duration::seconds(self.otp_grant_secs)
    }

    pub fn emergency_validity(&self) -> Duration {
        Duration::seconds(self.emergency_validity_secs)
    }

    pub fn sync_edit_window(&self) -> Duration {
        Duration::seconds(self.sync_edit_window_secs)
    }

    pub fn medication_active_window(&self) -> Duration {
        Duration::seconds(self.medication_active_secs)
    }

    pub fn urgent_notification_ttl(&self) -> Duration {
        Duration::seconds(self.urgent_notification_ttl_secs)
    }

    pub fn directory_cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.directory_cache_ttl_secs)
    }
}

/// Top-level YAML document: everything lives under `access_control:`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessControlConfigWrapper {
    pub access_control: AccessControlConfig,
}
