//! Probe strategy table
//!
//! Strategies are ordered from cheap and common to expensive:
//!
//! 1. `Configured paths` - roots the user listed in the configuration
//! 2. `Mounted volumes` - well-known mount points for this OS
//! 3. OS query - `mdfind`, `findmnt` or PowerShell CIM
//! 4. `Partition scan` - every mounted partition
//!
//! The USB bus signal is not part of the table. It never yields a path.

pub mod partitions;
pub mod paths;
pub mod shell;
pub mod usb;

pub use partitions::PartitionScanProbe;
pub use paths::{PathListProbe, SearchLocation};
pub use shell::CommandProbe;
pub use usb::{CommandUsbSignal, SysfsUsbSignal, APPLE_VENDOR_ID};

use crate::device::traits::{BusSignal, ProbeStrategy};
use std::path::PathBuf;

/// Build the strategy table for the current platform
///
/// The configured-paths probe is only registered when `extra_paths` is not empty.
pub fn platform_strategies(extra_paths: &[PathBuf]) -> Vec<Box<dyn ProbeStrategy>> {
    let mut strategies: Vec<Box<dyn ProbeStrategy>> = Vec::new();

    if !extra_paths.is_empty() {
        strategies.push(Box::new(PathListProbe::configured(extra_paths)));
    }
    strategies.push(Box::new(PathListProbe::mounted_volumes()));
    if let Some(query) = platform_query() {
        strategies.push(Box::new(query));
    }
    strategies.push(Box::new(PartitionScanProbe::new()));

    strategies
}

fn platform_query() -> Option<CommandProbe> {
    if cfg!(target_os = "macos") {
        Some(CommandProbe::spotlight())
    } else if cfg!(target_os = "linux") {
        Some(CommandProbe::fuse_mounts())
    } else if cfg!(windows) {
        Some(CommandProbe::removable_disks())
    } else {
        None
    }
}

/// USB presence signal for the current platform, if there is one
pub fn platform_bus_signal() -> Option<Box<dyn BusSignal>> {
    if cfg!(target_os = "linux") {
        Some(Box::new(SysfsUsbSignal::new()))
    } else if cfg!(target_os = "macos") {
        Some(Box::new(CommandUsbSignal::system_profiler()))
    } else if cfg!(windows) {
        Some(Box::new(CommandUsbSignal::pnp_devices()))
    } else {
        None
    }
}
