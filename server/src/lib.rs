// server/src/lib.rs
pub mod commands;
