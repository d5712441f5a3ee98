// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use aegis_dapps_core::domain::node_config::NodeConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./aegis-dapps.yaml)
        #[arg(short, long, default_value = "./aegis-dapps.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output } => generate(&output),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. AEGIS_DAPPS_CONFIG_PATH: {}",
            std::env::var("AEGIS_DAPPS_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./aegis-dapps.yaml");
        println!("  4. ~/.aegis/dapps.yaml");
        println!("  5. /etc/aegis/dapps.yaml");
        println!();
    }

    let dapps = &config.spec.dapps;
    let network = config.network();
    println!("{}", "Current configuration:".bold());
    println!("  Node: {}", config.metadata.name);
    println!("  Listen: {}:{}", network.bind_address, network.port);
    println!("  Dapps dir: {}", dapps.dapps_dir().display());
    println!("  Public dir: {}", dapps.public_dir.display());
    println!("  Temp dir: {}", dapps.tmp_dir.display());
    println!("  Sandbox: {} {}", dapps.interpreter, dapps.entry_point);
    println!("  Download timeout: {}s", dapps.download_timeout_seconds);
    println!(
        "  Master password: {}",
        if dapps.master_password.is_some() { "enabled" } else { "disabled" }
    );
    if !dapps.params.is_empty() {
        println!("  Launch params:");
        for (id, params) in &dapps.params {
            println!("    {} → {}", id, params.join(" "));
        }
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config.validate()?;

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!("Refusing to overwrite existing file {}", output.display());
    }
    let yaml = serde_yaml::to_string(&NodeConfigManifest::default())
        .context("Failed to render configuration")?;
    std::fs::write(output, yaml)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("{} {}", "✓ Wrote".green(), output.display());
    Ok(())
}
