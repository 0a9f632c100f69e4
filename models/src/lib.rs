// models/src/lib.rs

pub mod actor;
pub mod errors;
pub mod medical;
pub mod response;

pub use actor::{ActorContext, Role};
pub use errors::{AccessError, AccessResult, ErrorCategory};
pub use response::ApiResponse;
