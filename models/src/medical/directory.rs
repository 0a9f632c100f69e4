// models/src/medical/directory.rs
use serde::{Serialize, Deserialize};

use crate::actor::Role;

/// Minimal view of a platform user, enough to address and authorize them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub hospital_id: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        UserProfile {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            role,
            hospital_id: None,
        }
    }

    pub fn at_hospital(mut self, hospital_id: impl Into<String>) -> Self {
        self.hospital_id = Some(hospital_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hospital {
    pub id: String,
    pub name: String,
    /// User who administers the facility account, notified on break-glass use.
    pub admin_user_id: Option<String>,
}
