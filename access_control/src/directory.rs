// access_control/src/directory.rs
use std::sync::Arc;
use log::debug;

use caching::Cache;
use lib::config::AccessControlConfig;
use lib::storage_engine::{AccessStorageEngine, DirectoryStore};
use models::errors::{AccessError, AccessResult};
use models::medical::{Hospital, UserProfile};
use models::Role;

/// Read-through, TTL-cached lookups of users and hospitals.
#[derive(Clone)]
pub struct DirectoryResolver {
    storage: Arc<dyn AccessStorageEngine>,
    users: Cache<String, UserProfile>,
    hospitals: Cache<String, Hospital>,
}

impl DirectoryResolver {
    pub fn new(storage: Arc<dyn AccessStorageEngine>, config: &AccessControlConfig) -> Self {
        let ttl = config.directory_cache_ttl();
        DirectoryResolver {
            storage,
            users: Cache::with_ttl(config.directory_cache_capacity, ttl),
            hospitals: Cache::with_ttl(config.directory_cache_capacity, ttl),
        }
    }

    pub async fn find_user(&self, id: &str) -> AccessResult<Option<UserProfile>> {
        let key = id.to_string();
        if let Some(user) = self.users.get(&key).await {
            return Ok(Some(user));
        }
        let user = self.storage.get_user(id).await?;
        if let Some(user) = &user {
            debug!("Caching directory entry for user {}", id);
            self.users.insert(key, user.clone()).await;
        }
        Ok(user)
    }

    /// Fails with `NotFound` unless a user with this id and role exists.
    pub async fn require_user(&self, id: &str, role: Role) -> AccessResult<UserProfile> {
        match self.find_user(id).await? {
            Some(user) if user.role == role => Ok(user),
            _ => Err(AccessError::NotFound(format!("{} not found: {}", capitalize(role.as_str()), id))),
        }
    }

    pub async fn find_hospital(&self, id: &str) -> AccessResult<Option<Hospital>> {
        let key = id.to_string();
        if let Some(hospital) = self.hospitals.get(&key).await {
            return Ok(Some(hospital));
        }
        let hospital = self.storage.get_hospital(id).await?;
        if let Some(hospital) = &hospital {
            self.hospitals.insert(key, hospital.clone()).await;
        }
        Ok(hospital)
    }

    pub async fn require_hospital(&self, id: &str) -> AccessResult<Hospital> {
        self.find_hospital(id)
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("Hospital not found: {}", id)))
    }

    /// Writes through to the store and refreshes the cached copy.
    pub async fn register_user(&self, user: UserProfile) -> AccessResult<()> {
        self.storage.put_user(user.clone()).await?;
        self.users.insert(user.id.clone(), user).await;
        Ok(())
    }

    pub async fn register_hospital(&self, hospital: Hospital) -> AccessResult<()> {
        self.storage.put_hospital(hospital.clone()).await?;
        self.hospitals.insert(hospital.id.clone(), hospital).await;
        Ok(())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
