//! archlink CLI Binary
//!
//! Command-line interface for archive post resolution and backlink rendering.

use anyhow::Context;
use archlink::cli::{Cli, RunContext};
use archlink::config::{ConfigLoader, LoadOptions};
use archlink::logging::{init_logging, LoggingConfig};
use clap::Parser;
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(&cli);

    // Initialize logging early
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("archlink starting");

    if let Err(e) = run(&cli) {
        error!("Command failed: {:#}", e);
        match e.downcast_ref::<archlink::error::ArchlinkError>() {
            Some(domain) => eprintln!("{}", archlink::cli::map_error(domain)),
            None => eprintln!("{:#}", e),
        }
        process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let context = RunContext::new(cli.config.clone()).context("initializing archlink")?;
    info!("CLI context initialized");
    let output = context.execute(&cli.command)?;
    info!("Command completed successfully");
    println!("{}", output);
    Ok(())
}

/// Build logging configuration from CLI args, environment, and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let loaded = ConfigLoader::load_with(&LoadOptions {
        file: cli.config.clone(),
        ..LoadOptions::default()
    })
    .ok();
    let debug_mode = loaded.as_ref().map_or(false, |c| c.settings.debug_mode);
    let mut config = loaded
        .map(|c| c.logging)
        .unwrap_or_default()
        .with_debug_mode(debug_mode);

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = Some(file.clone());
    }

    config
}
