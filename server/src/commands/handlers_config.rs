// server/src/commands/handlers_config.rs
use anyhow::Result;

use lib::config::{config_to_yaml, AccessControlConfig};

pub fn handle_config_command(config: &AccessControlConfig) -> Result<()> {
    let yaml = config_to_yaml(config)?;
    println!("{}", yaml);
    Ok(())
}
