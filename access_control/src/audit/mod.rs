// access_control/src/audit/mod.rs
pub mod audit_trail;

pub use audit_trail::{AuditEvent, AuditPage, AuditTrail};
