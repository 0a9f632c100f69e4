// lib/src/lib.rs

pub mod clock;
pub mod config;
pub mod storage_engine;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AccessControlConfig, StorageConfig, StorageEngineType};
pub use storage_engine::{create_storage, AccessStorageEngine, InMemoryStorage, SledStorage};
