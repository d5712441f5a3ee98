// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS Dapp Host
//!
//! The `aegis-dapps` binary installs, launches and serves the dapps
//! registered on the ledger.
//!
//! ## Commands
//!
//! - `aegis-dapps serve` - Run the dapp host and its HTTP API
//! - `aegis-dapps config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use aegis_dapps::commands::{self, ConfigCommand};
use aegis_dapps_core::domain::node_config::NodeConfigManifest;
use aegis_dapps::server::{self, ServeOptions};

/// AEGIS Dapp Host - run ledger side-chain applications
#[derive(Parser)]
#[command(name = "aegis-dapps")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "AEGIS_DAPPS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// HTTP API port (default: from config)
    #[arg(long, global = true, env = "AEGIS_DAPPS_PORT")]
    port: Option<u16>,

    /// HTTP API host (default: from config)
    #[arg(long, global = true, env = "AEGIS_DAPPS_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AEGIS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format (text, json; default: from config)
    #[arg(long, global = true, env = "AEGIS_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dapp host
    #[command(name = "serve")]
    Serve,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_format = cli
        .log_format
        .clone()
        .or_else(|| configured_log_format(cli.config.clone()))
        .unwrap_or_else(|| "text".to_string());
    init_logging(&cli.log_level, &log_format)?;

    match cli.command {
        Some(Commands::Serve) => {
            server::start_daemon(ServeOptions {
                config: cli.config,
                host: cli.host,
                port: cli.port,
            })
            .await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// `spec.observability.logging.format`, read before the subscriber exists.
fn configured_log_format(config: Option<PathBuf>) -> Option<String> {
    NodeConfigManifest::load_or_default(config)
        .ok()
        .and_then(|c| c.logging().map(|l| l.format.clone()))
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
