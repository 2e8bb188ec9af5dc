//! Command-line argument definitions
//!
//! This module defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Copy photos and videos off a connected iPhone and convert HEIC to JPEG
#[derive(Parser, Debug)]
#[command(name = "iphone-transfer")]
#[command(author = "Vihaan Reddy M")]
#[command(version)]
#[command(about = "Find a connected iPhone, copy its photos and videos, and convert HEIC images to JPEG", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Destination folder (overrides config)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// iPhone storage root; skips automatic detection
    #[arg(short, long, global = true)]
    pub source: Option<PathBuf>,

    /// Detection attempts before giving up (overrides config)
    #[arg(short, long, global = true)]
    pub attempts: Option<u32>,

    /// Copy only, do not convert HEIC files
    #[arg(long, global = true)]
    pub no_convert: bool,

    /// Do not ask for a path when detection fails
    #[arg(long, global = true)]
    pub no_prompt: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log level: error, warn, info, debug, trace (overrides config)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Detect the iPhone, copy everything, then convert HEIC files (default)
    Transfer,

    /// Only look for the iPhone and report where its storage is
    Detect,

    /// Check whether a folder looks like iPhone storage
    Verify {
        /// Folder to check
        path: PathBuf,
    },

    /// Convert HEIC files in a folder to JPEG
    ///
    /// Useful after a transfer that was run with --no-convert or was
    /// interrupted during conversion. HEIC files an earlier run converted
    /// are skipped.
    Convert {
        /// Folder containing HEIC files
        dir: PathBuf,
    },

    /// List the detection strategies used on this platform
    Strategies,

    /// Show or reset the configuration file
    ///
    /// The config file is stored at:
    /// - Windows: %APPDATA%\iphone_media_transfer\config.toml
    /// - macOS: ~/Library/Application Support/iphone_media_transfer/config.toml
    /// - Linux: ~/.config/iphone_media_transfer/config.toml
    ///
    /// If no config file exists, a default one will be created.
    Config {
        /// Show the config file path only
        #[arg(long)]
        path: bool,

        /// Reset config to defaults (creates a fresh config file)
        #[arg(long)]
        reset: bool,
    },

    /// Generate a configuration file at a specific location
    GenerateConfig {
        /// Output path for the config file (defaults to standard location)
        #[arg(short = 'p', long = "path")]
        path: Option<PathBuf>,
    },

    /// Show current configuration
    ShowConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_none() {
        let args = Args::parse_from(["iphone-transfer"]);
        assert!(args.command.is_none());
        assert!(!args.no_convert);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "iphone-transfer",
            "transfer",
            "--output",
            "/tmp/photos",
            "--no-convert",
            "--attempts",
            "5",
        ]);
        assert_eq!(args.command, Some(Commands::Transfer));
        assert_eq!(args.output, Some(PathBuf::from("/tmp/photos")));
        assert!(args.no_convert);
        assert_eq!(args.attempts, Some(5));
    }

    #[test]
    fn test_verify_and_convert_take_paths() {
        let args = Args::parse_from(["iphone-transfer", "verify", "/Volumes/iPhone"]);
        assert_eq!(
            args.command,
            Some(Commands::Verify {
                path: PathBuf::from("/Volumes/iPhone")
            })
        );

        let args = Args::parse_from(["iphone-transfer", "convert", "./photos", "--json"]);
        assert!(args.json);
        assert!(matches!(args.command, Some(Commands::Convert { .. })));
    }
}
