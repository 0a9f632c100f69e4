// server/src/main.rs

// Entry point for the passport-access operator tool.

use anyhow::Result;
use passport_access_server::commands::start_cli;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    start_cli().await
}
