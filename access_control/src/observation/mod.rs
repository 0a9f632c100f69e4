// access_control/src/observation/mod.rs
pub mod edit_guard;
pub mod observation_guard;

pub use edit_guard::{can_edit, check_edit_access, EditWindowPolicy};
pub use observation_guard::ObservationEditGuard;
