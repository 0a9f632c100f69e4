// lib/src/config/config_helpers.rs
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, error, info, warn};
use serde_yaml2 as serde_yaml;

use models::errors::{AccessError, AccessResult};
use crate::config::config_defaults::{CONFIG_PATH_ENV_VAR, DEFAULT_CONFIG_PATH_RELATIVE};
use crate::config::config_structs::{AccessControlConfig, AccessControlConfigWrapper};

/// Explicit path first, then `PASSPORT_ACCESS_CONFIG`, then the relative default.
pub fn resolve_config_path(config_file_path: Option<&Path>) -> PathBuf {
    if let Some(path) = config_file_path {
        return path.to_path_buf();
    }
    match env::var(CONFIG_PATH_ENV_VAR) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH_RELATIVE),
    }
}

/// Loads the YAML config, falling back to defaults when the file is absent.
pub fn load_access_control_config(config_file_path: Option<&Path>) -> AccessResult<AccessControlConfig> {
    let path_to_use = resolve_config_path(config_file_path);
    info!("Attempting to load access control config from {:?}", path_to_use);

    if !path_to_use.exists() {
        warn!("Config file {:?} not found, using defaults", path_to_use);
        return Ok(AccessControlConfig::default());
    }

    let content = fs::read_to_string(&path_to_use).map_err(|e| {
        AccessError::ConfigurationError(format!("failed to read {}: {}", path_to_use.display(), e))
    })?;
    debug!("Access control config content: {}", content);
    let config = parse_access_control_config(&content).map_err(|e| {
        error!("YAML parsing error for access control config at {:?}: {}", path_to_use, e);
        e
    })?;
    info!("Loaded access control config from {:?}", path_to_use);
    Ok(config)
}

pub fn parse_access_control_config(content: &str) -> AccessResult<AccessControlConfig> {
    let wrapper: AccessControlConfigWrapper = serde_yaml::from_str(content)
        .map_err(|e| AccessError::ConfigurationError(format!("failed to parse YAML: {:?}", e)))?;
    validate_config(&wrapper.access_control)?;
    Ok(wrapper.access_control)
}

pub fn config_to_yaml(config: &AccessControlConfig) -> AccessResult<String> {
    let wrapper = AccessControlConfigWrapper { access_control: config.clone() };
    serde_yaml::to_string(&wrapper)
        .map_err(|e| AccessError::SerializationError(format!("failed to render YAML: {:?}", e)))
}

pub fn validate_config(config: &AccessControlConfig) -> AccessResult<()> {
    let windows = [
        ("otp_ttl_secs", config.otp_ttl_secs),
        ("otp_grant_secs", config.otp_grant_secs),
        ("consent_default_hours", config.consent_default_hours),
        ("consent_emergency_hours", config.consent_emergency_hours),
        ("consent_max_hours", config.consent_max_hours),
        ("emergency_validity_secs", config.emergency_validity_secs),
        ("sync_edit_window_secs", config.sync_edit_window_secs),
        ("medication_active_secs", config.medication_active_secs),
        ("urgent_notification_ttl_secs", config.urgent_notification_ttl_secs),
    ];
    for (name, value) in windows {
        if value <= 0 {
            return Err(AccessError::ConfigurationError(format!("{} must be positive, got {}", name, value)));
        }
    }
    if !(4..=9).contains(&config.otp_code_length) {
        return Err(AccessError::ConfigurationError(format!(
            "otp_code_length must be between 4 and 9, got {}",
            config.otp_code_length
        )));
    }
    if config.otp_max_attempts == 0 {
        return Err(AccessError::ConfigurationError("otp_max_attempts must be at least 1".into()));
    }
    if config.notification_queue_capacity == 0 {
        return Err(AccessError::ConfigurationError("notification_queue_capacity must be at least 1".into()));
    }
    if config.consent_default_hours > config.consent_max_hours {
        return Err(AccessError::ConfigurationError(
            "consent_default_hours cannot exceed consent_max_hours".into(),
        ));
    }
    Ok(())
}
