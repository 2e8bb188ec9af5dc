//! iPhone Media Transfer Library
//!
//! Locates the photo storage of a connected iPhone through whatever the
//! host operating system exposes (mount points, shell listings, partition
//! tables), copies its photos and videos to a local folder, and converts
//! HEIC images to JPEG while carrying over capture metadata.
//!
//! # Architecture
//!
//! - [`device`] - Probe strategies, the storage verification predicate and
//!   the retrying discovery engine
//! - [`core`] - Configuration, errors, cancellation, the copy/convert
//!   worker and image conversion
//! - [`ui`] - Background controllers and event channels for front ends
//! - [`cli`] - Command-line interface (only used by the binary)
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use iphone_media_transfer::core::config::Config;
//! use iphone_media_transfer::core::transfer::{TransferConfig, TransferWorker};
//! use iphone_media_transfer::device::{Discovery, DiscoveryOutcome};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default().unwrap_or_default();
//!
//!     let mut discovery = Discovery::from_config(&config.discovery);
//!     let outcome = discovery.run(|status| println!("{}", status));
//!
//!     if let DiscoveryOutcome::Found(handle) = outcome {
//!         let worker = TransferWorker::new(
//!             TransferConfig::with_destination(config.destination())
//!                 .with_progress(|update| println!("{}%", update.percent)),
//!         );
//!         let summary = worker.transfer(&handle)?;
//!         println!("{}", summary);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Platform Support
//!
//! Windows checks drive letters and the removable disks PowerShell's CIM
//! cmdlets report, macOS looks under `/Volumes`, and Linux checks
//! gvfs/ifuse/media mount points. Any platform accepts a manually entered path.

pub mod cli;
pub mod core;
pub mod device;
pub mod ui;

#[cfg(test)]
pub mod testdb;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
