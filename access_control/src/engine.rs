// access_control/src/engine.rs
use std::sync::Arc;
use anyhow::anyhow;
use log::info;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use lib::clock::{Clock, SystemClock};
use lib::config::AccessControlConfig;
use lib::storage_engine::{create_storage, AccessStorageEngine};
use models::errors::AccessResult;

use crate::audit::AuditTrail;
use crate::consent::ConsentRequestEngine;
use crate::context::EngineContext;
use crate::directory::DirectoryResolver;
use crate::emergency::EmergencyOverrideEngine;
use crate::notification::{LogMailer, Mailer, NotificationInbox, QueuedNotificationSink};
use crate::observation::ObservationEditGuard;
use crate::otp::OneTimeCodeEngine;

pub static ACCESS_CONTROL: OnceCell<Arc<AccessControlEngine>> = OnceCell::const_new();

/// All four engines wired against one store, clock and notification queue.
pub struct AccessControlEngine {
    pub consent: ConsentRequestEngine,
    pub otp: OneTimeCodeEngine,
    pub emergency: EmergencyOverrideEngine,
    pub observations: ObservationEditGuard,
    pub audit: AuditTrail,
    pub inbox: NotificationInbox,
    pub directory: DirectoryResolver,
    pub config: Arc<AccessControlConfig>,
    notifications: QueuedNotificationSink,
    worker: JoinHandle<()>,
}

impl AccessControlEngine {
    /// Spawns the notification worker, so it must run inside a tokio runtime.
    pub fn new(
        config: AccessControlConfig,
        storage: Arc<dyn AccessStorageEngine>,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let config = Arc::new(config);
        let (notifications, worker) =
            QueuedNotificationSink::spawn(config.notification_queue_capacity, storage.clone(), mailer);
        let ctx = EngineContext::new(storage.clone(), Arc::new(notifications.clone()), clock.clone(), config.clone());
        info!("Access control engine ready");
        AccessControlEngine {
            consent: ConsentRequestEngine::new(ctx.clone()),
            otp: OneTimeCodeEngine::new(ctx.clone()),
            emergency: EmergencyOverrideEngine::new(ctx.clone()),
            observations: ObservationEditGuard::new(ctx.clone()),
            audit: ctx.audit.clone(),
            inbox: NotificationInbox::new(storage, clock),
            directory: ctx.directory.clone(),
            config,
            notifications,
            worker,
        }
    }

    /// Store picked from `config.storage`, wall clock, logging mailer.
    pub fn from_config(config: AccessControlConfig) -> AccessResult<Self> {
        let storage = create_storage(&config.storage)?;
        Ok(Self::new(config, storage, Arc::new(SystemClock), Arc::new(LogMailer)))
    }

    /// Notifications accepted but not yet stored and mailed.
    pub fn pending_notifications(&self) -> usize {
        self.notifications.pending()
    }

    pub async fn wait_for_notifications(&self) {
        self.notifications.wait_idle().await
    }

    pub fn worker_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub async fn global_init(engine: AccessControlEngine) -> std::result::Result<(), &'static str> {
        ACCESS_CONTROL
            .set(Arc::new(engine))
            .map_err(|_| "AccessControlEngine already initialized")
    }

    pub async fn get() -> Result<Arc<Self>, anyhow::Error> {
        ACCESS_CONTROL
            .get()
            .cloned()
            .ok_or_else(|| anyhow!("AccessControlEngine not initialized! Call global_init(engine) first."))
    }
}

impl Drop for AccessControlEngine {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
