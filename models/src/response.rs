// models/src/response.rs
use serde::{Serialize, Deserialize};

use crate::errors::{AccessError, ErrorCategory};

/// Envelope handed to the HTTP layer: `{ success, message, data }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub category: ErrorCategory,
    pub status: u16,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(err: &AccessError) -> Self {
        ApiResponse {
            success: false,
            message: err.message().to_string(),
            data: None,
            error: Some(ErrorBody {
                category: err.category(),
                status: err.status_code(),
            }),
        }
    }

    pub fn from_result(result: Result<T, AccessError>, message: impl Into<String>) -> Self {
        match result {
            Ok(data) => Self::ok(message, data),
            Err(err) => Self::failure(&err),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.error.as_ref().map_or(200, |e| e.status)
    }
}
