// access_control/src/lib.rs
pub mod audit;
pub mod consent;
pub mod context;
pub mod directory;
pub mod emergency;
pub mod engine;
pub mod notification;
pub mod observation;
pub mod otp;

pub use audit::{AuditEvent, AuditPage, AuditTrail};
pub use consent::{ConsentRequestEngine, NewConsentRequest};
pub use context::EngineContext;
pub use directory::DirectoryResolver;
pub use emergency::{EmergencyGrant, EmergencyOverrideEngine, OverridePage, PatientEmergencyAudit};
pub use engine::{AccessControlEngine, ACCESS_CONTROL};
pub use notification::{
    EnqueueOutcome, LogMailer, Mailer, NotificationInbox, NotificationSink, OutboundNotification,
    QueuedNotificationSink,
};
pub use observation::{can_edit, check_edit_access, EditWindowPolicy, ObservationEditGuard};
pub use otp::{AccessAssertion, CodeIssuance, OneTimeCodeEngine};
