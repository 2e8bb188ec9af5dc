//! UI Events Module
//!
//! Event types sent from the discovery and transfer workers to a front end.
//! They travel over channels and can be consumed by any UI framework or the
//! bundled CLI.

use std::path::PathBuf;
use std::time::Duration;

use crate::core::transfer::{TransferSummary, TransferUpdate};
use crate::device::{DiscoveryOutcome, DiscoveryStatus, MediaSourceHandle};

// =============================================================================
// Discovery Events
// =============================================================================

/// Events emitted while looking for the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// Diagnostic from the orchestrator
    Status(DiscoveryStatus),
    /// Discovery ended; always the last event
    Finished(DiscoveryOutcome),
}

// =============================================================================
// Transfer Events
// =============================================================================

/// Events emitted during a transfer
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Transfer has started
    Started {
        /// Device root
        source: MediaSourceHandle,
        /// Destination folder
        destination: PathBuf,
    },

    /// Overall progress, 0-100
    Progress(TransferUpdate),

    /// Human-readable status line
    Status(String),

    /// Cancellation was requested
    Cancelling,

    /// Transfer ran to the end (possibly cancelled part way)
    Completed {
        /// Final counts
        summary: TransferSummary,
    },

    /// The transfer could not run
    Failed {
        /// Error message
        error: String,
    },
}

impl TransferEvent {
    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferEvent::Completed { .. } | TransferEvent::Failed { .. }
        )
    }
}

// =============================================================================
// Combined Event Type
// =============================================================================

/// All possible events that can be sent to the UI
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Discovery-related event
    Discovery(DiscoveryEvent),
    /// Transfer-related event
    Transfer(TransferEvent),
}

impl From<DiscoveryEvent> for UiEvent {
    fn from(event: DiscoveryEvent) -> Self {
        UiEvent::Discovery(event)
    }
}

impl From<TransferEvent> for UiEvent {
    fn from(event: TransferEvent) -> Self {
        UiEvent::Transfer(event)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// =============================================================================
// Tests
// =============================================================================
