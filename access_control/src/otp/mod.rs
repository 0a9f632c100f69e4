// access_control/src/otp/mod.rs
pub mod otp_engine;

pub use otp_engine::{AccessAssertion, CodeIssuance, OneTimeCodeEngine};
