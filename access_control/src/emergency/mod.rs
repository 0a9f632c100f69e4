// access_control/src/emergency/mod.rs
pub mod emergency_engine;

pub use emergency_engine::{
    EmergencyGrant, EmergencyOverrideEngine, EmergencySummary, OverridePage, PatientEmergencyAudit,
};
