// lib/src/storage_engine/mod.rs
use std::sync::Arc;
use log::info;

use models::errors::AccessResult;
use crate::config::{StorageConfig, StorageEngineType};

pub mod inmemory_storage;
pub mod sled_storage;
pub mod storage_engine;

pub use inmemory_storage::InMemoryStorage;
pub use sled_storage::SledStorage;
pub use storage_engine::{
    paginate, AccessStorageEngine, AuditLogStore, ConsentRequestStore, DirectoryStore,
    EmergencyOverrideStore, NotificationStore, ObservationStore, OneTimeCodeStore, PassportStore,
};

/// Builds the backend named by `config.engine`.
pub fn create_storage(config: &StorageConfig) -> AccessResult<Arc<dyn AccessStorageEngine>> {
    match config.engine {
        StorageEngineType::InMemory => {
            info!("Using in-memory access store");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        StorageEngineType::Sled if config.temporary => {
            info!("Using temporary sled access store");
            Ok(Arc::new(SledStorage::temporary()?))
        }
        StorageEngineType::Sled => Ok(Arc::new(SledStorage::open(&config.path)?)),
    }
}
