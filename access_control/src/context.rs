// access_control/src/context.rs
use std::sync::Arc;

use lib::clock::Clock;
use lib::config::AccessControlConfig;
use lib::storage_engine::AccessStorageEngine;
use models::errors::{AccessError, AccessResult};

use crate::audit::AuditTrail;
use crate::directory::DirectoryResolver;
use crate::notification::{NotificationComposer, NotificationSink, OutboundNotification};

/// Collaborators every engine shares.
#[derive(Clone)]
pub struct EngineContext {
    pub storage: Arc<dyn AccessStorageEngine>,
    pub audit: AuditTrail,
    pub notifier: Arc<dyn NotificationSink>,
    pub composer: NotificationComposer,
    pub directory: DirectoryResolver,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<AccessControlConfig>,
}

impl EngineContext {
    pub fn new(
        storage: Arc<dyn AccessStorageEngine>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: Arc<AccessControlConfig>,
    ) -> Self {
        EngineContext {
            audit: AuditTrail::new(storage.clone(), clock.clone()),
            composer: NotificationComposer::new(clock.clone(), config.urgent_notification_ttl()),
            directory: DirectoryResolver::new(storage.clone(), &config),
            storage,
            notifier,
            clock,
            config,
        }
    }

    /// Hands a message to the sink; a rejection only comes back as a warning.
    pub fn notify(&self, notification: OutboundNotification) -> Option<String> {
        self.notifier.enqueue(notification).warning()
    }
}

/// Trims `value` and checks its length in characters.
pub fn validate_text(field: &str, value: &str, min: usize, max: usize) -> AccessResult<String> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min {
        return Err(AccessError::Validation(format!(
            "{} must be at least {} characters (got {})",
            field, min, len
        )));
    }
    if len > max {
        return Err(AccessError::Validation(format!(
            "{} cannot exceed {} characters (got {})",
            field, max, len
        )));
    }
    Ok(trimmed.to_string())
}

/// Optional free text: blank becomes `None`, otherwise bounded by `max`.
pub fn validate_optional_text(field: &str, value: Option<&str>, max: usize) -> AccessResult<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => validate_text(field, v, 1, max).map(Some),
        None => Ok(None),
    }
}
