// lib/src/config/mod.rs
pub mod config_defaults;
pub mod config_helpers;
pub mod config_structs;

pub use config_defaults::*;
pub use config_helpers::{
    config_to_yaml, load_access_control_config, parse_access_control_config, resolve_config_path,
    validate_config,
};
pub use config_structs::{AccessControlConfig, AccessControlConfigWrapper, StorageConfig, StorageEngineType};
