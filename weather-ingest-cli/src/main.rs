//! Binary crate for the `weather-ingest` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Logger setup and storage selection at startup
//! - Printing invocation results for operators and schedulers

use clap::Parser;
use std::process::ExitCode;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let cmd = cli::Cli::parse();
    cmd.run().await
}
