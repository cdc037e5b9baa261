//! # Chimaera Host Runner Binary
//!
//! Emulates one Chimaera device on the host.
//!
//! # Usage
//!
//! ```bash
//! # Run with the configuration in the working directory
//! chimaera_fw
//!
//! # Explicit configuration, verbose JSON logs
//! chimaera_fw --config /etc/chimaera/chimaera.toml -v --json
//! ```

use clap::Parser;
use chimaera_common::config::{ConfigError, ConfigLoader, HostConfig};
use chimaera_config::context::ResetMode;
use chimaera_fw::{Exit, Runner};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Chimaera host runner - configuration core on UDP sockets
#[derive(Parser, Debug)]
#[command(name = "chimaera_fw")]
#[command(version)]
#[command(about = "Chimaera sensor array emulated on the host")]
#[command(long_about = None)]
struct Args {
    /// Path to the host configuration file.
    #[arg(short, long, default_value = "chimaera.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("Runner failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match HostConfig::load(&args.config) {
        Ok(config) => Some(config),
        Err(ConfigError::FileNotFound) => None,
        Err(e) => return Err(e.into()),
    };
    setup_tracing(&args, config.as_ref());

    info!("Chimaera host runner v{} starting...", env!("CARGO_PKG_VERSION"));
    let config = config.unwrap_or_else(|| {
        warn!("No configuration at {:?}, using defaults", args.config);
        HostConfig::default()
    });

    let mut runner = Runner::new(config.clone())?;
    let running = runner.running_flag();
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        handler_flag.store(false, Ordering::SeqCst);
    })?;

    loop {
        let exit = runner.run();
        runner.shutdown();

        match exit {
            Exit::Stopped => break,
            Exit::Reset(ResetMode::Bootloader) => {
                info!("Bootloader requested, no bootloader on host");
                break;
            }
            Exit::Reset(mode) => info!("Restarting after {} reset", mode.as_str()),
        }
        // Sockets of the old device must be released before rebinding.
        drop(runner);
        runner = Runner::with_running_flag(config.clone(), Arc::clone(&running))?;
    }

    info!("Chimaera host runner shutdown complete");
    Ok(())
}

/// Setup tracing subscriber from CLI arguments and the configured level.
fn setup_tracing(args: &Args, config: Option<&HostConfig>) {
    let level = if args.verbose {
        "debug"
    } else {
        config.map_or("info", |c| c.shared.log_level.as_filter())
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
