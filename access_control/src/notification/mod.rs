// access_control/src/notification/mod.rs
pub mod notification_inbox;
pub mod notification_sink;

pub use notification_inbox::NotificationInbox;
pub use notification_sink::{
    EnqueueOutcome, LogMailer, Mailer, NotificationComposer, NotificationSink, OutboundNotification,
    QueuedNotificationSink,
};
