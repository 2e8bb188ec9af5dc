//! Progress display utilities for CLI output
//!
//! Key features:
//! - Progress bars that suspend cleanly when printing status lines
//! - Consistent visual styling across all operations

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::{Duration, Instant};

use crate::core::transfer::{TransferPhase, TransferUpdate};

// ============================================================================
// Styles - Consistent visual appearance
// ============================================================================

/// Get the spinner style for detection
fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷")
}

/// Get the progress bar style for transfers
fn progress_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {spinner:.green} [{bar:40.cyan/dim}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━╾─")
}

/// Get the style for completed progress bars
fn completed_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  ✓ [{bar:40.green/dim}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━━")
}

// ============================================================================
// Console output helpers
// ============================================================================

/// Print a header section with a box
pub fn print_header(title: &str) {
    let width = 68;
    let title_padded = format!("{:^width$}", title, width = width - 4);
    println!();
    println!("╔{}╗", "═".repeat(width - 2));
    println!("║{}║", title_padded);
    println!("╚{}╝", "═".repeat(width - 2));
    println!();
}

/// Print a success message with checkmark
pub fn print_success(msg: &str) {
    println!("  ✓ {}", msg);
}

/// Print an info message with bullet
pub fn print_info(msg: &str) {
    println!("  • {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("  ⚠ {}", msg);
}

/// Print an error message
pub fn print_error(msg: &str) {
    println!("  ✗ {}", msg);
}

// ============================================================================
// Detection spinner
// ============================================================================

/// Spinner shown while the device is being looked for
pub struct DetectionSpinner {
    spinner: ProgressBar,
    start_time: Instant,
}

impl DetectionSpinner {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner.set_message("Looking for your iPhone...");

        Self {
            spinner,
            start_time: Instant::now(),
        }
    }

    /// Print a status line above the spinner
    pub fn log(&self, msg: &str) {
        self.spinner.suspend(|| {
            println!("  → {}", msg);
        });
    }

    pub fn set_message(&self, msg: &str) {
        self.spinner.set_message(msg.to_string());
    }

    /// Finish and clear the spinner
    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for DetectionSpinner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Transfer progress
// ============================================================================

/// 0-100 progress bar for a transfer
pub struct TransferProgress {
    progress_bar: ProgressBar,
    start_time: Instant,
}

impl TransferProgress {
    pub fn new() -> Self {
        let progress_bar = ProgressBar::new(100);
        progress_bar.set_style(progress_bar_style());
        progress_bar.enable_steady_tick(Duration::from_millis(100));
        progress_bar.set_message("Preparing...");

        Self {
            progress_bar,
            start_time: Instant::now(),
        }
    }

    /// Apply a progress update from the worker
    pub fn update(&self, update: &TransferUpdate) {
        self.progress_bar.set_position(u64::from(update.percent));
        self.progress_bar.set_message(phase_message(update));
    }

    /// Print a status line above the bar
    pub fn log(&self, msg: &str) {
        self.progress_bar.suspend(|| {
            println!("  {}", msg);
        });
    }

    /// Finish the progress display
    pub fn finish(&self) {
        self.progress_bar.set_style(completed_style());
        self.progress_bar.finish_with_message(format!(
            "Complete in {:.1}s",
            self.start_time.elapsed().as_secs_f64()
        ));
    }

    /// Stop the bar where it is
    pub fn abandon(&self, msg: &str) {
        self.progress_bar.abandon_with_message(format!("✗ {}", msg));
    }
}

impl Default for TransferProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Short description of what the worker is doing
pub fn phase_message(update: &TransferUpdate) -> String {
    let file = update
        .current_file
        .as_ref()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned());

    let action = match update.phase {
        TransferPhase::Preparing => return "Preparing...".to_string(),
        TransferPhase::Complete => return "Done".to_string(),
        TransferPhase::Copying => "Copying",
        TransferPhase::Converting => "Converting",
    };

    match file {
        Some(name) => format!("{} {}/{} {}", action, update.completed, update.total, name),
        None => format!("{} {} file(s)", action, update.total),
    }
}

// ============================================================================
// Dual writer for file + console logging
// ============================================================================

/// A writer that writes to both console and file
///
/// Used for logging to both stderr and a log file simultaneously.
pub struct DualWriter {
    pub console: std::io::Stderr,
    pub file: std::fs::File,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = self.console.write(buf);
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn update(phase: TransferPhase, completed: usize, total: usize, file: Option<&str>) -> TransferUpdate {
        TransferUpdate {
            phase,
            percent: 0,
            completed,
            total,
            current_file: file.map(PathBuf::from),
        }
    }

    #[test]
    fn test_phase_message() {
        assert_eq!(
            phase_message(&update(
                TransferPhase::Copying,
                3,
                10,
                Some("/phone/DCIM/100APPLE/IMG_0003.HEIC")
            )),
            "Copying 3/10 IMG_0003.HEIC"
        );
        assert_eq!(
            phase_message(&update(TransferPhase::Converting, 0, 4, None)),
            "Converting 4 file(s)"
        );
        assert_eq!(
            phase_message(&update(TransferPhase::Complete, 0, 0, None)),
            "Done"
        );
    }
}
