// access_control/src/notification/notification_inbox.rs
use std::sync::Arc;
use log::info;
use uuid::Uuid;

use lib::clock::Clock;
use lib::storage_engine::{AccessStorageEngine, NotificationStore};
use models::errors::{AccessError, AccessResult};
use models::medical::NotificationMessage;
use models::ActorContext;

/// Recipient-side view of stored notifications.
#[derive(Clone)]
pub struct NotificationInbox {
    storage: Arc<dyn AccessStorageEngine>,
    clock: Arc<dyn Clock>,
}

impl NotificationInbox {
    pub fn new(storage: Arc<dyn AccessStorageEngine>, clock: Arc<dyn Clock>) -> Self {
        NotificationInbox { storage, clock }
    }

    /// Unread and not yet expired, newest first.
    pub async fn unread(&self, actor: &ActorContext) -> AccessResult<Vec<NotificationMessage>> {
        let now = self.clock.now();
        Ok(self
            .storage
            .find_notifications(&actor.actor_id, true)
            .await?
            .into_iter()
            .filter(|n| !n.is_expired(now))
            .collect())
    }

    pub async fn all(&self, actor: &ActorContext) -> AccessResult<Vec<NotificationMessage>> {
        self.storage.find_notifications(&actor.actor_id, false).await
    }

    pub async fn mark_read(&self, actor: &ActorContext, notification_id: &Uuid) -> AccessResult<NotificationMessage> {
        let notification = self
            .storage
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("Notification not found: {}", notification_id)))?;
        if notification.recipient_user_id != actor.actor_id {
            return Err(AccessError::Forbidden("Not authorized to modify this notification".into()));
        }
        let updated = self
            .storage
            .mark_notification_read(notification_id, self.clock.now())
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("Notification not found: {}", notification_id)))?;
        info!("Notification {} marked read by {}", notification_id, actor.actor_id);
        Ok(updated)
    }
}
