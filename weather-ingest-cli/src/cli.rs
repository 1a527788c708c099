use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use weather_ingest_core::{
    Config, DateRange, Environment, RawObservationPayload, StorageKind, SystemClock, invoke,
    validate,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-ingest", version, about = "Historical weather ingestion")]
pub struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StorageArg {
    Auto,
    Local,
    Object,
}

impl From<StorageArg> for StorageKind {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::Auto => StorageKind::Auto,
            StorageArg::Local => StorageKind::Local,
            StorageArg::Object => StorageKind::Object,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the pipeline once over every configured location.
    Run {
        /// Override `storage.kind` from the config file.
        #[arg(long, value_enum)]
        storage: Option<StorageArg>,

        /// Identifier supplied by the trigger, echoed in failure responses.
        #[arg(long)]
        request_id: Option<String>,
    },

    /// Check a payload file against the data contract.
    Validate {
        /// Raw API response, or a stored record with a `raw_response` field.
        file: PathBuf,
    },

    /// Print the lookback window for today.
    Range {
        /// Lookback length; defaults to `data.history_days`.
        #[arg(long)]
        days: Option<i64>,
    },

    /// Write the default configuration file.
    Init {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        match self.command {
            Command::Run { storage, request_id } => {
                let mut config = Config::load(self.config.as_deref())?;
                if let Some(kind) = storage {
                    config.storage.kind = kind.into();
                }

                let env = Environment::capture();
                let response = invoke(&config, &env, request_id.as_deref()).await;

                println!("{}", serde_json::to_string_pretty(&response.body)?);
                Ok(if response.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
            }
            Command::Validate { file } => {
                Ok(if validate_file(&file)? { ExitCode::SUCCESS } else { ExitCode::FAILURE })
            }
            Command::Range { days } => {
                let days = match days {
                    Some(d) => d,
                    None => Config::load(self.config.as_deref())?.data.history_days,
                };
                let range = DateRange::from_clock(&SystemClock, days)?;
                println!("{} {}", range.start_str(), range.end_str());
                Ok(ExitCode::SUCCESS)
            }
            Command::Init { force } => {
                let path = match self.config {
                    Some(p) => p,
                    None => Config::config_file_path()?,
                };
                if path.exists() && !force {
                    bail!("{} already exists; pass --force to overwrite", path.display());
                }

                Config::default().save(&path)?;
                info!("Wrote default configuration to {}", path.display());
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

/// Prints the outcome and returns whether the payload passed.
fn validate_file(file: &Path) -> anyhow::Result<bool> {
    let contents = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut payload: RawObservationPayload = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    // Stored records wrap the upstream response.
    if payload.get("raw_response").is_some() {
        payload = payload["raw_response"].take();
    }

    match validate(&payload) {
        Ok(model) => {
            println!("OK: {} data points", model.hourly.len());
            Ok(true)
        }
        Err(report) => {
            for v in &report.violations {
                println!("{}: {}", v.field, v.reason);
            }
            Ok(false)
        }
    }
}
