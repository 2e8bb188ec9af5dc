//! Worker controllers
//!
//! Run discovery and transfers on background threads and hand events back
//! to the front end through channels. Only one transfer runs at a time.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, warn};

use crate::core::cancel::CancellationToken;
use crate::core::convert::{Converter, DEFAULT_JPEG_QUALITY};
use crate::core::error::{Result, TransferError};
use crate::core::transfer::{TransferConfig, TransferWorker};
use crate::device::{Discovery, DiscoveryOutcome, MediaSourceHandle};
use crate::ui::events::{DiscoveryEvent, TransferEvent};

// =============================================================================
// Controller State
// =============================================================================

/// Current state of the transfer controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControllerState {
    /// Ready for a new transfer
    Idle = 0,
    /// Copying or converting
    Transferring = 1,
    /// Cancellation requested, worker still finishing its current file
    Cancelling = 2,
    /// Last transfer finished
    Completed = 3,
    /// Last transfer failed before it could start copying
    Error = 4,
}

impl From<u8> for ControllerState {
    fn from(value: u8) -> Self {
        match value {
            1 => ControllerState::Transferring,
            2 => ControllerState::Cancelling,
            3 => ControllerState::Completed,
            4 => ControllerState::Error,
            _ => ControllerState::Idle,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Discovery Controller
// =============================================================================

/// Runs a discovery session on a background thread
#[derive(Default)]
pub struct DiscoveryController {
    cancel: Mutex<CancellationToken>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    /// Cancelled sessions still finishing their current probe
    retired: Mutex<Vec<JoinHandle<()>>>,
}

impl DiscoveryController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `discovery` and return its event stream
    ///
    /// The stream ends with exactly one [`DiscoveryEvent::Finished`].
    pub fn start(&self, discovery: Discovery) -> Receiver<DiscoveryEvent> {
        let (event_tx, event_rx) = unbounded();
        let cancel = CancellationToken::new();
        std::mem::replace(&mut *lock(&self.cancel), cancel.clone()).cancel();

        let mut discovery = discovery.with_cancellation(cancel);
        let handle = thread::spawn(move || {
            let outcome = discovery.run(|status| {
                let _ = event_tx.send(DiscoveryEvent::Status(status.clone()));
            });
            debug!("Discovery finished: {:?}", outcome);
            let _ = event_tx.send(DiscoveryEvent::Finished(outcome));
        });

        if let Some(previous) = lock(&self.worker_handle).replace(handle) {
            let mut retired = lock(&self.retired);
            retired.retain(|worker| !worker.is_finished());
            retired.push(previous);
        }
        event_rx
    }

    /// Ask the running session to stop
    pub fn cancel(&self) {
        lock(&self.cancel).cancel();
    }

    /// Wait for the worker thread, and any session it replaced, to exit
    pub fn wait(&self) {
        let retired = std::mem::take(&mut *lock(&self.retired));
        let current = lock(&self.worker_handle).take();
        for handle in retired.into_iter().chain(current) {
            if handle.join().is_err() {
                error!("Discovery worker panicked");
            }
        }
    }

    /// Start a session and block until it ends
    pub fn run_blocking<F>(&self, discovery: Discovery, mut on_event: F) -> DiscoveryOutcome
    where
        F: FnMut(&DiscoveryEvent),
    {
        let events = self.start(discovery);
        let mut outcome = DiscoveryOutcome::Cancelled;
        for event in events.iter() {
            on_event(&event);
            if let DiscoveryEvent::Finished(result) = event {
                outcome = result;
            }
        }
        self.wait();
        outcome
    }
}

impl Drop for DiscoveryController {
    fn drop(&mut self) {
        self.cancel();
        self.wait();
    }
}

// =============================================================================
// Transfer Controller
// =============================================================================

/// Runs transfers on a background thread, one at a time
pub struct TransferController {
    state: Arc<AtomicU8>,
    cancel: Mutex<CancellationToken>,
    event_tx: Mutex<Option<Sender<TransferEvent>>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    jpeg_quality: u8,
}

impl TransferController {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(ControllerState::Idle as u8)),
            cancel: Mutex::new(CancellationToken::new()),
            event_tx: Mutex::new(None),
            worker_handle: Mutex::new(None),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Set JPEG quality for converted files
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Get current state
    pub fn state(&self) -> ControllerState {
        ControllerState::from(self.state.load(Ordering::SeqCst))
    }

    /// Check if a transfer is running
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            ControllerState::Transferring | ControllerState::Cancelling
        )
    }

    /// Start a transfer from `source`
    ///
    /// Progress and status callbacks in `config` are replaced by event
    /// forwarding. Fails with [`TransferError::AlreadyRunning`] while
    /// another transfer is active.
    pub fn start_transfer(
        &self,
        source: MediaSourceHandle,
        config: TransferConfig,
    ) -> Result<Receiver<TransferEvent>> {
        let claimed = self.state.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            match ControllerState::from(current) {
                ControllerState::Transferring | ControllerState::Cancelling => None,
                _ => Some(ControllerState::Transferring as u8),
            }
        });
        if claimed.is_err() {
            return Err(TransferError::AlreadyRunning);
        }

        // Reap the previous worker, which has already sent its final event.
        if let Some(previous) = lock(&self.worker_handle).take() {
            let _ = previous.join();
        }

        let (event_tx, event_rx) = unbounded();
        let cancel = CancellationToken::new();
        *lock(&self.cancel) = cancel.clone();
        *lock(&self.event_tx) = Some(event_tx.clone());

        let progress_tx = event_tx.clone();
        let status_tx = event_tx.clone();
        let config = config
            .with_progress(move |update| {
                let _ = progress_tx.send(TransferEvent::Progress(update));
            })
            .with_status(move |message| {
                let _ = status_tx.send(TransferEvent::Status(message));
            });

        let _ = event_tx.send(TransferEvent::Started {
            source: source.clone(),
            destination: config.destination.clone(),
        });

        let state = Arc::clone(&self.state);
        let converter = Converter::with_quality(self.jpeg_quality);
        let handle = thread::spawn(move || {
            let worker =
                TransferWorker::with_cancellation(config, cancel).with_converter(converter);
            match worker.transfer(&source) {
                Ok(summary) => {
                    state.store(ControllerState::Completed as u8, Ordering::SeqCst);
                    let _ = event_tx.send(TransferEvent::Completed { summary });
                }
                Err(e) => {
                    warn!("Transfer failed: {}", e);
                    state.store(ControllerState::Error as u8, Ordering::SeqCst);
                    let _ = event_tx.send(TransferEvent::Failed {
                        error: e.to_string(),
                    });
                }
            }
        });

        *lock(&self.worker_handle) = Some(handle);
        Ok(event_rx)
    }

    /// Request cancellation; returns false when nothing is running
    pub fn cancel(&self) -> bool {
        let requested = self
            .state
            .compare_exchange(
                ControllerState::Transferring as u8,
                ControllerState::Cancelling as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !requested {
            return false;
        }

        lock(&self.cancel).cancel();
        if let Some(tx) = lock(&self.event_tx).as_ref() {
            let _ = tx.send(TransferEvent::Cancelling);
        }
        true
    }

    /// Wait for the worker thread to exit
    pub fn wait(&self) {
        if let Some(handle) = lock(&self.worker_handle).take() {
            if handle.join().is_err() {
                error!("Transfer worker panicked");
                self.state
                    .store(ControllerState::Error as u8, Ordering::SeqCst);
            }
        }
        lock(&self.event_tx).take();
    }
}

impl Default for TransferController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TransferController {
    fn drop(&mut self) {
        self.cancel();
        self.wait();
    }
}

// =============================================================================
// Tests
// =============================================================================
