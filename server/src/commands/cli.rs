// server/src/commands/cli.rs
use std::path::PathBuf;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::info;

use access_control::AccessControlEngine;
use lib::config::{load_access_control_config, validate_config, AccessControlConfig, StorageEngineType};

use crate::commands::handlers_access::{handle_consent_check, handle_emergency_check};
use crate::commands::handlers_audit::{handle_audit_command, handle_overrides_command};
use crate::commands::handlers_config::handle_config_command;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Patient passport access-control operator tool", long_about = None)]
#[clap(propagate_version = true)]
pub struct CliArgs {
    /// Path to the YAML configuration (falls back to PASSPORT_ACCESS_CONFIG, then ./config/access_control.yaml)
    #[clap(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,
    /// Sled database directory, overriding the configured storage
    #[clap(long, global = true)]
    pub db: Option<PathBuf>,
    /// Print JSON instead of plain text
    #[clap(long, global = true, action = clap::ArgAction::SetTrue)]
    pub json: bool,
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// List audit entries for a patient, newest first
    Audit {
        #[arg(long)]
        patient: String,
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// List emergency overrides
    Overrides {
        #[arg(long)]
        doctor: Option<String>,
        #[arg(long)]
        patient: Option<String>,
        #[arg(long, value_parser = parse_timestamp, help = "RFC 3339 lower bound on access time")]
        since: Option<DateTime<Utc>>,
        #[arg(long, value_parser = parse_timestamp, help = "RFC 3339 upper bound on access time")]
        until: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Whether a doctor holds an approved, unexpired consent for a patient
    ConsentCheck {
        #[arg(long)]
        doctor: String,
        #[arg(long)]
        patient: String,
    },
    /// Whether a doctor's emergency override for a patient is still valid
    EmergencyCheck {
        #[arg(long)]
        doctor: String,
        #[arg(long)]
        patient: String,
    },
    /// Print the effective configuration as YAML
    Config,
}

fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", value, e))
}

/// Operator commands always read a persistent store.
fn effective_config(args: &CliArgs) -> Result<AccessControlConfig> {
    let mut config = load_access_control_config(args.config.as_deref())
        .context("Failed to load access control configuration")?;
    if let Some(db) = &args.db {
        config.storage.engine = StorageEngineType::Sled;
        config.storage.path = db.clone();
    } else if config.storage.engine == StorageEngineType::InMemory {
        info!("Configured store is in-memory; using sled at {:?}", config.storage.path);
        config.storage.engine = StorageEngineType::Sled;
    }
    validate_config(&config)?;
    Ok(config)
}

pub async fn start_cli() -> Result<()> {
    let args = CliArgs::parse();
    let config = effective_config(&args)?;

    if let Commands::Config = args.command {
        return handle_config_command(&config);
    }

    let engine = AccessControlEngine::from_config(config)
        .context("Failed to open access store")?;

    match args.command {
        Commands::Audit { patient, limit, offset } => {
            handle_audit_command(&engine, &patient, limit, offset, args.json).await
        }
        Commands::Overrides { doctor, patient, since, until, limit, offset } => {
            handle_overrides_command(&engine, doctor, patient, since, until, limit, offset, args.json).await
        }
        Commands::ConsentCheck { doctor, patient } => handle_consent_check(&engine, &doctor, &patient, args.json).await,
        Commands::EmergencyCheck { doctor, patient } => {
            handle_emergency_check(&engine, &doctor, &patient, args.json).await
        }
        Commands::Config => Ok(()),
    }
}
