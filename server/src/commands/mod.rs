// server/src/commands/mod.rs

// Operator command parsing and the handlers each subcommand dispatches to.

pub mod cli;
pub mod handlers_access;
pub mod handlers_audit;
pub mod handlers_config;

pub use cli::{start_cli, CliArgs, Commands};
