//! iPhone Media Transfer - CLI Entry Point
//!
//! Finds a connected iPhone's storage, copies its photos and videos to a
//! local folder, and converts HEIC images to JPEG.
//!
//! This binary is a thin wrapper around the library, handling argument parsing,
//! logging setup, and command dispatch.

use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use iphone_media_transfer::cli::{self, Args, DualWriter};
use iphone_media_transfer::core::cancel::CancellationToken;
use iphone_media_transfer::core::config::Config;
use log::{info, warn, LevelFilter};
use std::fs::OpenOptions;
use std::io::Write;

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(ref config_path) = args.config {
        match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Warning: Failed to load config file: {}", e);
                Config::default()
            }
        }
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Apply CLI overrides to config
    if let Some(ref output) = args.output {
        config.output.directory = output.clone();
    }
    if let Some(attempts) = args.attempts {
        config.discovery.attempts = attempts;
    }
    if args.no_convert {
        config.conversion.enabled = false;
    }
    if let Some(ref level) = args.log_level {
        config.logging.level = level.clone();
    }

    // Set up graceful shutdown handler
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();

    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            // Second Ctrl+C - force exit
            eprintln!("\nForce shutdown requested. Exiting immediately...");
            std::process::exit(1);
        } else {
            handler_token.cancel();
            eprintln!("\nStopping after the current file... (Press Ctrl+C again to force quit)");
        }
    })?;

    init_logging(&config);

    info!("iPhone Media Transfer v{}", iphone_media_transfer::VERSION);

    // Run the command
    cli::run_command(&args, &config, cancel)?;

    Ok(())
}

fn init_logging(config: &Config) {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    if !config.logging.log_to_file {
        Builder::from_env(env_logger::Env::default().default_filter_or(&config.logging.level))
            .init();
        return;
    }

    // Set up logging to both console and file
    let log_file = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.logging.log_file)
    {
        Ok(file) => file,
        Err(e) => {
            Builder::new().filter_level(log_level).init();
            warn!(
                "Cannot open log file {}: {}; logging to the console only",
                config.logging.log_file.display(),
                e
            );
            return;
        }
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(DualWriter {
            console: std::io::stderr(),
            file: log_file,
        })))
        .init();

    info!("Logging to file: {}", config.logging.log_file.display());
}
