//! USB bus enumeration for Apple devices
//!
//! Never produces a path. Discovery uses it to tell "no phone plugged in"
//! apart from "phone plugged in but its storage is not visible yet".

use crate::device::command::run_with_timeout;
use crate::device::traits::{BusSignal, ProbeContext};
use log::debug;
use std::fs;
use std::path::PathBuf;

/// Apple's USB vendor id
pub const APPLE_VENDOR_ID: u16 = 0x05ac;

/// Reads `idVendor` files under a sysfs-style devices folder (Linux)
#[derive(Debug, Clone)]
pub struct SysfsUsbSignal {
    devices_dir: PathBuf,
}

impl SysfsUsbSignal {
    pub fn new() -> Self {
        Self::at(PathBuf::from("/sys/bus/usb/devices"))
    }

    /// Read from a different devices folder
    pub fn at(devices_dir: PathBuf) -> Self {
        Self { devices_dir }
    }
}

impl Default for SysfsUsbSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl BusSignal for SysfsUsbSignal {
    fn name(&self) -> &str {
        "USB devices (sysfs)"
    }

    fn device_present(&self, _ctx: &ProbeContext) -> bool {
        let Ok(entries) = fs::read_dir(&self.devices_dir) else {
            return false;
        };
        let wanted = format!("{:04x}", APPLE_VENDOR_ID);
        entries.flatten().any(|entry| {
            fs::read_to_string(entry.path().join("idVendor"))
                .map(|id| id.trim().eq_ignore_ascii_case(&wanted))
                .unwrap_or(false)
        })
    }
}

/// Looks for the Apple vendor id in a command's output (macOS, Windows)
#[derive(Debug, Clone)]
pub struct CommandUsbSignal {
    name: String,
    program: String,
    args: Vec<String>,
    needle: String,
}

impl CommandUsbSignal {
    pub fn new(name: &str, program: &str, args: &[&str], needle: &str) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            needle: needle.to_lowercase(),
        }
    }

    /// `system_profiler SPUSBDataType` (macOS)
    pub fn system_profiler() -> Self {
        Self::new(
            "USB devices (system_profiler)",
            "system_profiler",
            &["SPUSBDataType"],
            &format!("0x{:04x}", APPLE_VENDOR_ID),
        )
    }

    /// Plug-and-play device ids through PowerShell (Windows)
    pub fn pnp_devices() -> Self {
        Self::new(
            "USB devices (PnP)",
            "powershell",
            &[
                "-NoProfile",
                "-NonInteractive",
                "-Command",
                "Get-PnpDevice -PresentOnly | ForEach-Object { $_.InstanceId }",
            ],
            &format!("VID_{:04X}", APPLE_VENDOR_ID),
        )
    }
}

impl BusSignal for CommandUsbSignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_present(&self, ctx: &ProbeContext) -> bool {
        match run_with_timeout(&self.program, &self.args, ctx.command_timeout) {
            Ok(output) => output.to_lowercase().contains(&self.needle),
            Err(e) => {
                debug!("{}: {}", self.name, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysfs_detects_apple_vendor() {
        let sys = tempfile::tempdir().unwrap();
        fs::create_dir_all(sys.path().join("1-1")).unwrap();
        fs::write(sys.path().join("1-1/idVendor"), "046d\n").unwrap();
        let signal = SysfsUsbSignal::at(sys.path().to_path_buf());
        assert!(!signal.device_present(&ProbeContext::default()));

        fs::create_dir_all(sys.path().join("1-2")).unwrap();
        fs::write(sys.path().join("1-2/idVendor"), "05ac\n").unwrap();
        assert!(signal.device_present(&ProbeContext::default()));
    }

    #[test]
    fn test_sysfs_missing_folder() {
        let signal = SysfsUsbSignal::at(PathBuf::from("/no/such/sysfs"));
        assert!(!signal.device_present(&ProbeContext::default()));
    }

    #[test]
    fn test_command_signal_missing_tool() {
        let signal = CommandUsbSignal::new("Broken", "definitely-not-a-real-program-xyz", &[], "x");
        assert!(!signal.device_present(&ProbeContext::default()));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_signal_matches_output() {
        let signal = CommandUsbSignal::new("Echo", "echo", &["Vendor ID: 0x05AC (Apple Inc.)"], "0x05ac");
        assert!(signal.device_present(&ProbeContext::default()));
    }
}
