// access_control/src/notification/notification_sink.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::Duration;
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use lib::clock::Clock;
use lib::storage_engine::{AccessStorageEngine, NotificationStore};
use models::errors::AccessResult;
use models::medical::{EmailEnvelope, NotificationMessage, NotificationType, Priority};

/// An in-app notification plus the optional mail that accompanies it.
#[derive(Debug, Clone)]
pub struct OutboundNotification {
    pub message: NotificationMessage,
    pub email: Option<EmailEnvelope>,
}

/// Whether the sink accepted a message. Never an error: callers only turn a
/// rejection into an advisory flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queue was full; handed to a task that waits for room.
    Deferred,
    Rejected(String),
}

impl EnqueueOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, EnqueueOutcome::Rejected(_))
    }

    pub fn warning(&self) -> Option<String> {
        match self {
            EnqueueOutcome::Rejected(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

/// Fire-and-forget outbound channel for alerts.
pub trait NotificationSink: Send + Sync {
    fn enqueue(&self, notification: OutboundNotification) -> EnqueueOutcome;
}

/// Outbound mail transport. Delivery itself lives outside this crate.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, envelope: &EmailEnvelope) -> AccessResult<()>;
}

/// Transport that only logs; stands in until a real one is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, envelope: &EmailEnvelope) -> AccessResult<()> {
        info!("Email to {} - {}", envelope.to, envelope.subject);
        Ok(())
    }
}

/// Stamps ids, timestamps and the urgent-notification expiry.
#[derive(Clone)]
pub struct NotificationComposer {
    clock: Arc<dyn Clock>,
    urgent_ttl: Duration,
}

impl NotificationComposer {
    pub fn new(clock: Arc<dyn Clock>, urgent_ttl: Duration) -> Self {
        NotificationComposer { clock, urgent_ttl }
    }

    pub fn compose(
        &self,
        recipient_user_id: &str,
        notification_type: NotificationType,
        priority: Priority,
        title: impl Into<String>,
        message: impl Into<String>,
        data: Value,
    ) -> NotificationMessage {
        let now = self.clock.now();
        NotificationMessage {
            id: Uuid::new_v4(),
            recipient_user_id: recipient_user_id.to_string(),
            notification_type,
            title: title.into(),
            message: message.into(),
            data,
            priority,
            is_read: false,
            read_at: None,
            expires_at: (priority == Priority::Urgent).then(|| now + self.urgent_ttl),
            created_at: now,
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn start(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Bounded mpsc queue drained by a single background worker that persists
/// each notification and then hands its mail to the `Mailer`.
#[derive(Clone)]
pub struct QueuedNotificationSink {
    sender: mpsc::Sender<OutboundNotification>,
    in_flight: Arc<InFlight>,
}

impl QueuedNotificationSink {
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        capacity: usize,
        storage: Arc<dyn AccessStorageEngine>,
        mailer: Arc<dyn Mailer>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let in_flight = Arc::new(InFlight::default());
        let worker = tokio::spawn(run_worker(receiver, storage, mailer, in_flight.clone()));
        info!("Notification worker started (queue capacity {})", capacity);
        (QueuedNotificationSink { sender, in_flight }, worker)
    }

    pub fn pending(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Resolves once every accepted notification has been processed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl NotificationSink for QueuedNotificationSink {
    fn enqueue(&self, notification: OutboundNotification) -> EnqueueOutcome {
        self.in_flight.start();
        match self.sender.try_send(notification) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(notification)) => {
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    self.in_flight.finish();
                    warn!("Notification queue full and no runtime to defer on, dropping {}", notification.message.id);
                    return EnqueueOutcome::Rejected("notification queue is full".into());
                };
                warn!("Notification queue full, deferring {}", notification.message.id);
                let sender = self.sender.clone();
                let in_flight = self.in_flight.clone();
                handle.spawn(async move {
                    if let Err(e) = sender.send(notification).await {
                        error!("Deferred notification {} lost: worker stopped", e.0.message.id);
                        in_flight.finish();
                    }
                });
                EnqueueOutcome::Deferred
            }
            Err(mpsc::error::TrySendError::Closed(notification)) => {
                self.in_flight.finish();
                error!("Notification queue closed, dropping {}", notification.message.id);
                EnqueueOutcome::Rejected("notification queue is closed".into())
            }
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<OutboundNotification>,
    storage: Arc<dyn AccessStorageEngine>,
    mailer: Arc<dyn Mailer>,
    in_flight: Arc<InFlight>,
) {
    while let Some(notification) = receiver.recv().await {
        deliver(storage.as_ref(), mailer.as_ref(), notification).await;
        in_flight.finish();
    }
    info!("Notification worker stopped");
}

async fn deliver(storage: &dyn AccessStorageEngine, mailer: &dyn Mailer, notification: OutboundNotification) {
    let OutboundNotification { message, email } = notification;
    let id = message.id;
    let recipient = message.recipient_user_id.clone();
    match storage.insert_notification(message).await {
        Ok(()) => debug!("Stored notification {} for {}", id, recipient),
        Err(e) => error!("Failed to store notification {} for {}: {}", id, recipient, e),
    }
    if let Some(envelope) = email {
        if let Err(e) = mailer.send(&envelope).await {
            warn!("Failed to send email '{}' to {}: {}", envelope.subject, envelope.to, e);
        }
    }
}
