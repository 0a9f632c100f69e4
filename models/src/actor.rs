// models/src/actor.rs
use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};

use crate::errors::AccessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
    Hospital,
    Receptionist,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
            Role::Hospital => "hospital",
            Role::Receptionist => "receptionist",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "admin" => Ok(Role::Admin),
            "hospital" => Ok(Role::Hospital),
            "receptionist" => Ok(Role::Receptionist),
            other => Err(AccessError::Validation(format!("unknown role '{}'", other))),
        }
    }
}

/// Already-authenticated caller identity handed to every engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorContext {
    pub actor_id: String,
    pub role: Role,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ActorContext {
    pub fn new(actor_id: impl Into<String>, role: Role) -> Self {
        ActorContext {
            actor_id: actor_id.into(),
            role,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn doctor(actor_id: impl Into<String>) -> Self {
        Self::new(actor_id, Role::Doctor)
    }

    pub fn patient(actor_id: impl Into<String>) -> Self {
        Self::new(actor_id, Role::Patient)
    }

    pub fn admin(actor_id: impl Into<String>) -> Self {
        Self::new(actor_id, Role::Admin)
    }

    pub fn with_origin(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails with `Forbidden` unless the actor holds `role`.
    pub fn require_role(&self, role: Role, action: &str) -> Result<(), AccessError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AccessError::Forbidden(format!(
                "only a {} may {} (caller is {})",
                role, action, self.role
            )))
        }
    }
}
