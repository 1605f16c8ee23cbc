// src/main.rs

//! The main entry point for the doorwarden access-control server.

use anyhow::{Context, Result, anyhow};
use doorwarden::config::Config;
use doorwarden::server::{self, ServerRuntime};
use std::env;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

/// How long the runtime waits for stray tasks when joining its threads.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_CONFIG_PATH: &str = "doorwarden.toml";
const DEFAULT_LOG_LEVEL: &str = "info";

fn main() -> Result<()> {
    const VERSION: &str = env!("DOORWARDEN_BUILD_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--version") {
        println!("doorwarden version {VERSION}");
        return Ok(());
    }

    let config_path = flag_value(&args, "--config")?.unwrap_or(DEFAULT_CONFIG_PATH);

    // Logging comes up before the config is read so that loading and
    // validation messages are not lost. `RUST_LOG` wins over `log_level`.
    let env_log_level = env::var("RUST_LOG").ok();
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(
        env_log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL),
    ));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true), // Enable ANSI color codes for log levels.
        )
        .init();

    // The server cannot run without a valid configuration.
    let mut config = match Config::from_file_or_default(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };
    apply_overrides(&mut config, &args)?;

    if env_log_level.is_none() {
        reload_handle
            .reload(EnvFilter::new(&config.log_level))
            .context("Failed to apply log_level from the configuration")?;
    }
    config.validate().context("Invalid configuration")?;

    info!("Starting doorwarden {VERSION}");

    let runtime = ServerRuntime::new(config.worker_threads)
        .context("Failed to build the I/O runtime")?;
    let result = runtime.block_on(server::run(config, runtime.handle()));
    runtime.shutdown(RUNTIME_SHUTDOWN_TIMEOUT);

    if let Err(e) = &result {
        error!("Server runtime error: {:#}", e);
    }
    result
}

/// Applies `--client-port`, `--admin-port` and `--admin-name` on top of the file.
fn apply_overrides(config: &mut Config, args: &[String]) -> Result<()> {
    if let Some(port) = flag_value(args, "--client-port")? {
        config.client_port = parse_port(port)?;
    }
    if let Some(port) = flag_value(args, "--admin-port")? {
        config.admin_port = parse_port(port)?;
    }
    if let Some(name) = flag_value(args, "--admin-name")? {
        config.admin_name = name.to_string();
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>> {
    match args.iter().position(|arg| arg == flag) {
        Some(i) => args
            .get(i + 1)
            .map(|value| Some(value.as_str()))
            .ok_or_else(|| anyhow!("{flag} flag requires a value")),
        None => Ok(None),
    }
}

fn parse_port(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .map_err(|_| anyhow!("Invalid port number: {value}"))
}
