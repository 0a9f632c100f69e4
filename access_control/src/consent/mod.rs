// access_control/src/consent/mod.rs
pub mod consent_engine;

pub use consent_engine::{ConsentRequestEngine, NewConsentRequest};
