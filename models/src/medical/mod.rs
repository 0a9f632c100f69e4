// models/src/medical/mod.rs
pub mod audit_log;
pub mod consent_request;
pub mod directory;
pub mod emergency_override;
pub mod notification;
pub mod observation;
pub mod one_time_code;
pub mod patient_passport;

pub use audit_log::{AccessType, AuditAction, AuditFilter, AuditLogEntry};
pub use consent_request::{
    ConsentDecision, ConsentRequest, ConsentRequestFilter, ConsentStatus, DataCategory, RequestType,
};
pub use directory::{Hospital, UserProfile};
pub use emergency_override::{EmergencyOverride, EmergencyOverrideFilter};
pub use notification::{EmailEnvelope, NotificationMessage, NotificationType, Priority};
pub use observation::{EditAccessInfo, EditWindow, MedicationStatus, ObservationKind, ObservationRecord};
pub use one_time_code::{CodeSlot, OneTimeCode};
pub use patient_passport::{PassportAccessRecord, PassportAccessType, PatientPassport};
