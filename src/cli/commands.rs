//! Command handler implementations
//!
//! This module contains the implementation of all CLI commands.

use crate::cli::progress::{
    print_error, print_header, print_info, print_success, print_warning, DetectionSpinner,
    TransferProgress,
};
use crate::cli::{Args, Commands};
use crate::core::cancel::CancellationToken;
use crate::core::config::{get_config_path, init_config, Config};
use crate::core::convert::Converter;
use crate::core::transfer::{TransferConfig, TransferSummary, TransferWorker};
use crate::device::strategies::{platform_bus_signal, platform_strategies};
use crate::device::{
    submit_manual_path, Discovery, DiscoveryOutcome, MediaSourceHandle, Verification, Verifier,
};
use crate::ui::{
    format_bytes, format_duration, DiscoveryController, DiscoveryEvent, TransferController,
    TransferEvent,
};
use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use dialoguer::Input;
use log::{debug, info, warn};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How often the CLI checks for Ctrl+C while waiting on a worker
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the appropriate command based on CLI arguments
pub fn run_command(args: &Args, config: &Config, cancel: CancellationToken) -> Result<()> {
    match args.command.clone().unwrap_or(Commands::Transfer) {
        Commands::Transfer => transfer(args, config, &cancel),
        Commands::Detect => detect(args, config, &cancel),
        Commands::Verify { path } => verify_path(args, config, &path),
        Commands::Convert { dir } => convert_directory(args, config, &dir, &cancel),
        Commands::Strategies => list_strategies(config),
        Commands::Config { path, reset } => handle_config_command(path, reset),
        Commands::GenerateConfig { path } => generate_config_file(path),
        Commands::ShowConfig => show_config(config),
    }
}

// ============================================================================
// Transfer
// ============================================================================

/// Detect (or take) the source, copy everything and convert HEIC files
pub fn transfer(args: &Args, config: &Config, cancel: &CancellationToken) -> Result<()> {
    if !args.json {
        print_header("iPhone Media Transfer");
    }

    let Some(source) = resolve_source(args, config, cancel)? else {
        if cancel.is_cancelled() {
            info!("Cancelled before a device was found");
            return Ok(());
        }
        bail!("No iPhone storage found. Connect and unlock the phone, or pass --source <PATH>.");
    };

    let destination = config.destination();
    if !args.json {
        print_success(&format!("Source: {}", source));
        print_info(&format!("Destination: {}", destination.display()));
        if !config.conversion.enabled {
            print_info("HEIC conversion is off");
        }
        println!();
    }

    let transfer_config = TransferConfig::with_destination(&destination)
        .convert(config.conversion.enabled)
        .on_conflict(config.output.on_conflict);
    let controller = TransferController::new().with_jpeg_quality(config.conversion.jpeg_quality);
    let events = controller.start_transfer(source, transfer_config)?;

    let summary = follow_transfer(&controller, events, args.json, cancel);
    controller.wait();
    let summary = summary?;

    report_summary(&summary, args.json)?;

    if config.output.open_when_done && !summary.cancelled {
        if let Err(e) = open::that(&destination) {
            warn!("Could not open {}: {}", destination.display(), e);
        }
    }
    Ok(())
}

/// Render transfer events until the worker finishes
fn follow_transfer(
    controller: &TransferController,
    events: Receiver<TransferEvent>,
    quiet: bool,
    cancel: &CancellationToken,
) -> Result<TransferSummary> {
    let progress = (!quiet).then(TransferProgress::new);
    let mut cancel_forwarded = false;

    loop {
        if cancel.is_cancelled() && !cancel_forwarded {
            cancel_forwarded = controller.cancel();
        }

        let event = match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                bail!("Transfer worker stopped without reporting a result")
            }
        };

        match event {
            TransferEvent::Started { source, destination } => {
                debug!("Transfer {} -> {}", source, destination.display());
            }
            TransferEvent::Progress(update) => {
                if let Some(ref bar) = progress {
                    bar.update(&update);
                }
            }
            TransferEvent::Status(message) => {
                info!("{}", message);
                if let Some(ref bar) = progress {
                    bar.log(&message);
                }
            }
            TransferEvent::Cancelling => {
                if let Some(ref bar) = progress {
                    bar.log("Stopping after the current file...");
                }
            }
            TransferEvent::Completed { summary } => {
                if let Some(ref bar) = progress {
                    if summary.cancelled {
                        bar.abandon("Cancelled");
                    } else {
                        bar.finish();
                    }
                }
                return Ok(summary);
            }
            TransferEvent::Failed { error } => {
                if let Some(ref bar) = progress {
                    bar.abandon(&error);
                }
                return Err(anyhow!(error));
            }
        }
    }
}

fn report_summary(summary: &TransferSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!();
    if summary.cancelled {
        print_warning("Transfer cancelled. Files already copied were kept.");
    } else if summary.is_clean() {
        print_success("Transfer complete");
    } else {
        print_warning("Transfer finished with errors");
    }
    print_info(&format!(
        "Copied {} of {} file(s) ({})",
        summary.copied,
        summary.files_found,
        format_bytes(summary.bytes_copied)
    ));
    print_info(&format!("Converted {} HEIC file(s) to JPEG", summary.converted));
    if summary.copy_skipped + summary.convert_skipped > 0 {
        print_info(&format!(
            "Skipped {} file(s) already present",
            summary.copy_skipped + summary.convert_skipped
        ));
    }
    for failure in &summary.failures {
        print_error(&failure.to_string());
    }
    print_info(&format!(
        "Took {}",
        format_duration(Duration::from_millis(summary.duration_ms))
    ));
    print_info(&format!("Saved to {}", summary.destination.display()));
    Ok(())
}

// ============================================================================
// Detection
// ============================================================================

/// `--source` if given, otherwise run detection and fall back to a prompt
fn resolve_source(
    args: &Args,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<Option<MediaSourceHandle>> {
    let verifier = Verifier::with_scan_limit(config.discovery.verify_scan_limit);

    if let Some(ref path) = args.source {
        let handle = submit_manual_path(path, &verifier)
            .with_context(|| format!("'{}' cannot be used as the source", path.display()))?;
        return Ok(Some(handle));
    }

    match run_detection(config, args.json, cancel) {
        DiscoveryOutcome::Found(handle) => Ok(Some(handle)),
        DiscoveryOutcome::Cancelled => Ok(None),
        DiscoveryOutcome::Exhausted { .. } if args.no_prompt || args.json => Ok(None),
        DiscoveryOutcome::Exhausted { .. } => prompt_manual_path(&verifier),
    }
}

/// Run discovery with a spinner, printing each status line
fn run_detection(config: &Config, quiet: bool, cancel: &CancellationToken) -> DiscoveryOutcome {
    let discovery = Discovery::from_config(&config.discovery);
    let controller = DiscoveryController::new();
    let events = controller.start(discovery);
    let spinner = (!quiet).then(DetectionSpinner::new);

    let mut outcome = DiscoveryOutcome::Cancelled;
    loop {
        if cancel.is_cancelled() {
            controller.cancel();
        }
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(DiscoveryEvent::Status(status)) => {
                info!("{}", status);
                if let Some(ref spinner) = spinner {
                    spinner.log(&status.to_string());
                }
            }
            Ok(DiscoveryEvent::Finished(result)) => {
                outcome = result;
                break;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(spinner) = spinner {
        debug!("Detection took {:.1}s", spinner.elapsed().as_secs_f64());
        spinner.finish();
    }
    controller.wait();
    outcome
}

/// Ask for a path until one verifies or the user gives up
fn prompt_manual_path(verifier: &Verifier) -> Result<Option<MediaSourceHandle>> {
    println!();
    print_warning("Could not find your iPhone automatically.");
    print_info("Make sure it is unlocked and that you tapped 'Trust'.");
    print_info("You can also enter the folder that contains its DCIM folder.");

    loop {
        let input: String = Input::new()
            .with_prompt("iPhone path (leave empty to cancel)")
            .allow_empty(true)
            .interact_text()?;
        let input = input.trim();
        if input.is_empty() {
            return Ok(None);
        }

        match submit_manual_path(Path::new(input), verifier) {
            Ok(handle) => return Ok(Some(handle)),
            Err(e) => print_error(&e.to_string()),
        }
    }
}

/// Only look for the device
pub fn detect(args: &Args, config: &Config, cancel: &CancellationToken) -> Result<()> {
    let outcome = run_detection(config, args.json, cancel);

    if args.json {
        let value = match &outcome {
            DiscoveryOutcome::Found(handle) => json!({ "found": true, "source": handle }),
            DiscoveryOutcome::Exhausted {
                attempts,
                probes_run,
            } => json!({ "found": false, "attempts": attempts, "probes_run": probes_run }),
            DiscoveryOutcome::Cancelled => json!({ "found": false, "cancelled": true }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match outcome {
        DiscoveryOutcome::Found(handle) => {
            print_success(&format!("Found iPhone storage: {}", handle.root().display()));
            print_info(&format!("Strategy: {}", handle.strategy()));
            print_info(&format!("Transport: {}", handle.transport()));
            Ok(())
        }
        DiscoveryOutcome::Exhausted { attempts, .. } => {
            bail!("No iPhone found after {} attempt(s)", attempts)
        }
        DiscoveryOutcome::Cancelled => {
            print_warning("Detection cancelled");
            Ok(())
        }
    }
}

/// Check a user-supplied path against the verification predicate
pub fn verify_path(args: &Args, config: &Config, path: &Path) -> Result<()> {
    let verifier = Verifier::with_scan_limit(config.discovery.verify_scan_limit);
    let verdict = if path.is_dir() {
        verifier.inspect(path)
    } else {
        Verification::Rejected("not an existing folder".to_string())
    };

    let explanation = match &verdict {
        Verification::VendorFolder(name) => format!("found Apple camera folder DCIM/{}", name),
        Verification::VendorFile(file) => format!("found iPhone photo {}", file.display()),
        Verification::WeakEvidence => {
            "DCIM exists but is empty or unreadable; the phone may be locked".to_string()
        }
        Verification::Rejected(reason) => reason.clone(),
    };

    if args.json {
        let value = json!({
            "path": path,
            "accepted": verdict.is_accepted(),
            "reason": explanation,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if verdict.is_accepted() {
        print_success(&format!("{} looks like iPhone storage", path.display()));
        print_info(&explanation);
        if verdict == Verification::WeakEvidence {
            print_warning("Unlock the phone and tap 'Trust' before transferring.");
        }
    } else {
        print_error(&format!(
            "{} does not look like iPhone storage: {}",
            path.display(),
            explanation
        ));
    }

    if verdict.is_accepted() {
        Ok(())
    } else {
        bail!("verification failed for {}", path.display())
    }
}

// ============================================================================
// Conversion only
// ============================================================================

/// Convert HEIC files already sitting in `dir`
pub fn convert_directory(
    args: &Args,
    config: &Config,
    dir: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let progress = (!args.json).then(|| Arc::new(TransferProgress::new()));
    let statuses: Arc<Mutex<Vec<String>>> = Arc::default();

    let mut transfer_config = TransferConfig::with_destination(dir);
    if let Some(ref bar) = progress {
        let bar = Arc::clone(bar);
        transfer_config = transfer_config.with_progress(move |update| bar.update(&update));
    }
    let sink = Arc::clone(&statuses);
    transfer_config = transfer_config.with_status(move |message| {
        if let Ok(mut lines) = sink.lock() {
            lines.push(message);
        }
    });

    let worker = TransferWorker::with_cancellation(transfer_config, cancel.clone())
        .with_converter(Converter::with_quality(config.conversion.jpeg_quality));
    let result = worker.convert_only();

    if let Some(ref bar) = progress {
        match &result {
            Ok(summary) if !summary.cancelled => bar.finish(),
            Ok(_) => bar.abandon("Cancelled"),
            Err(e) => bar.abandon(&e.to_string()),
        }
    }
    let summary = result?;

    if !args.json {
        if let Ok(lines) = statuses.lock() {
            for line in lines.iter() {
                print_info(line);
            }
        }
    }
    report_summary(&summary, args.json)
}

// ============================================================================
// Strategies and configuration
// ============================================================================

/// Print the detection strategy table for this platform
pub fn list_strategies(config: &Config) -> Result<()> {
    print_header("Detection strategies");

    let strategies = platform_strategies(&config.discovery.extra_search_paths);
    for (index, strategy) in strategies.iter().enumerate() {
        println!(
            "  {}. {} ({})",
            index + 1,
            strategy.name(),
            strategy.transport()
        );
    }

    println!();
    match platform_bus_signal() {
        Some(signal) => print_info(&format!("USB signal: {}", signal.name())),
        None => print_info("USB signal: not available on this platform"),
    }
    print_info(&format!(
        "{} attempt(s), {} ms apart, {}s command timeout",
        config.discovery.attempts.max(1),
        config.discovery.retry_delay_ms,
        config.discovery.command_timeout().as_secs()
    ));
    Ok(())
}

/// Handle config command - show path or reset to defaults
pub fn handle_config_command(show_path: bool, reset: bool) -> Result<()> {
    if reset {
        let path = init_config(true)?;
        print_success(&format!("Created fresh config file at: {}", path.display()));
        return Ok(());
    }

    let path = Config::get_active_config_path();
    if show_path {
        println!("{}", path.display());
        return Ok(());
    }

    if path.exists() {
        print_info(&format!("Config file: {}", path.display()));
    } else {
        let created = init_config(false)?;
        print_success(&format!("Created config file at: {}", created.display()));
    }
    print_info("Edit this file to change detection, output and conversion settings.");
    print_info("Run 'iphone-transfer show-config' to verify your settings.");
    Ok(())
}

/// Generate a configuration file at the specified or default location
pub fn generate_config_file(output: Option<PathBuf>) -> Result<()> {
    let output_path = match output {
        Some(path) => {
            fs::write(&path, Config::generate_default_config())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            path
        }
        None => init_config(false)?,
    };

    print_success(&format!("Configuration file: {}", output_path.display()));
    print_info("Edit this file to customize the transfer settings.");
    Ok(())
}

/// Show the current configuration settings
pub fn show_config(config: &Config) -> Result<()> {
    let config_path = Config::get_active_config_path();
    println!("# Configuration file: {}", config_path.display());
    if !config_path.exists() {
        println!("# (Using default settings - no config file found)");
        if let Some(standard) = get_config_path() {
            println!("# Standard location: {}", standard.display());
        }
    }
    println!("# Effective destination: {}", config.destination().display());
    println!();
    print!("{}", config.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::MediaTreeBuilder;
    use clap::Parser;

    fn quiet_args(extra: &[&str]) -> Args {
        let mut argv = vec!["iphone-transfer", "--json", "--no-prompt"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_transfer_with_source_flag() {
        let tree = MediaTreeBuilder::new()
            .folder_with_files("100APPLE", &["IMG_0001.HEIC", "IMG_0002.JPG"])
            .build();
        let dest = tempfile::tempdir().unwrap();
        let root = tree.root().to_string_lossy().into_owned();
        let args = quiet_args(&["--source", &root]);

        let mut config = Config::default();
        config.output.directory = dest.path().to_path_buf();

        transfer(&args, &config, &CancellationToken::new()).unwrap();
        assert!(dest.path().join("IMG_0001.HEIC").exists());
        assert!(dest.path().join("IMG_0001.jpg").exists());
        assert!(dest.path().join("IMG_0002.JPG").exists());
    }

    #[test]
    fn test_transfer_rejects_bad_source() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let args = quiet_args(&["--source", &root]);

        let result = transfer(&args, &Config::default(), &CancellationToken::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_verify_path_command() {
        let tree = MediaTreeBuilder::new().apple_folder("100APPLE").build();
        let args = quiet_args(&[]);

        assert!(verify_path(&args, &Config::default(), tree.root()).is_ok());

        let empty = tempfile::tempdir().unwrap();
        assert!(verify_path(&args, &Config::default(), empty.path()).is_err());
    }

    #[test]
    fn test_convert_directory_command() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("IMG_0007.HEIC"),
            crate::testdb::FixtureImage::iphone_capture().jpeg_bytes(),
        )
        .unwrap();

        let args = quiet_args(&[]);
        convert_directory(&args, &Config::default(), dir.path(), &CancellationToken::new())
            .unwrap();
        assert!(dir.path().join("IMG_0007.jpg").exists());
    }
}
