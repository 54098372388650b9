//! CLI entry point for processio.
//!
//! This binary provides the `processio` command: it loads configuration,
//! opens the configured storage backend, builds the variable engine and
//! dispatches one subcommand against it.

mod cli;
mod commands;
mod config;
mod helpers;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use processio_engine::{EngineError, VariableEngine};
use tracing::{error, info};

use crate::cli::Cli;
use crate::commands::{Caller, CallerError};
use crate::config::ServiceConfig;

/// Exit status for caller errors (bad input, missing privileges).
const EXIT_CLIENT_ERROR: u8 = 2;
/// Exit status for storage and I/O failures.
const EXIT_SERVER_ERROR: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Missing .env is fine.
    let _ = dotenvy::dotenv();

    let config = match ServiceConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(EXIT_SERVER_ERROR);
        }
    };
    helpers::init_tracing("info", config.log_json);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "command failed");
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli, config: ServiceConfig) -> Result<()> {
    info!(database = %config.database, "starting processio");

    let backend = config.open_backend().await?;
    let engine = VariableEngine::new(backend).with_timeout(config.storage_timeout());

    let caller = Caller {
        user: cli.user,
        admin: cli.admin,
    };
    commands::dispatch(&engine, &caller, cli.command).await
}

/// Map an error to the boundary's client/server split.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<EngineError>() {
        Some(engine_err) if !engine_err.is_client_error() => EXIT_SERVER_ERROR,
        Some(_) => EXIT_CLIENT_ERROR,
        None if err.is::<CallerError>() => EXIT_CLIENT_ERROR,
        None if err
            .downcast_ref::<processio_store::StoreError>()
            .is_some_and(|e| e.is_validation()) =>
        {
            EXIT_CLIENT_ERROR
        }
        None => EXIT_SERVER_ERROR,
    }
}
