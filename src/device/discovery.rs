//! Discovery orchestrator
//!
//! Runs the probe strategy table in order and stops at the first candidate
//! that passes verification. The whole table is retried a bounded number of
//! times with a fixed delay, since a phone often needs a moment after being
//! plugged in or unlocked before its storage is listable.
//!
//! ```text
//! Idle -> Probing(i) -> Verifying(candidate) -> Found(handle)
//!            ^   |              |
//!            |   +-- next i <---+ (rejected)
//!            +-- next attempt        ... -> Exhausted
//! ```

use crate::core::cancel::CancellationToken;
use crate::core::config::DiscoveryConfig;
use crate::core::error::VerificationError;
use crate::device::strategies::{platform_bus_signal, platform_strategies};
use crate::device::traits::{
    BusSignal, MediaSourceHandle, ProbeContext, ProbeResult, ProbeStrategy, Transport,
};
use crate::device::verify::{Verification, Verifier};
use log::{debug, info, trace, warn};
use std::fmt::{self, Display};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Strategy name recorded on handles built from manual entry
pub const MANUAL_STRATEGY_NAME: &str = "Manual entry";

/// How often and how patiently to run the strategy table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Full passes over the strategy table (at least 1)
    pub attempts: u32,
    /// Pause between passes
    pub delay: Duration,
    /// Stop retrying early when the bus signal reports no device
    pub require_bus_signal: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
            require_bus_signal: false,
        }
    }
}

impl RetryPolicy {
    /// A single pass with no delay
    pub fn once() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
            require_bus_signal: false,
        }
    }
}

/// Where the orchestrator is in a discovery session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    Probing { attempt: u32, index: usize },
    Verifying { attempt: u32, index: usize, candidate: PathBuf },
    Found(MediaSourceHandle),
    Exhausted,
}

/// Result of one strategy run, as reported in diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    NoCandidate,
    Rejected(PathBuf),
    Accepted(PathBuf),
}

/// Human-readable progress of a discovery session
///
/// Purely observational; nothing depends on receiving these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryStatus {
    AttemptStarted { attempt: u32, of: u32 },
    StrategyFinished {
        attempt: u32,
        strategy: String,
        outcome: StrategyOutcome,
    },
    AccessDenied { path: PathBuf },
    BusSignal { name: String, present: bool },
    Retrying { delay: Duration },
    Exhausted { attempts: u32 },
    Cancelled,
}

impl Display for DiscoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryStatus::AttemptStarted { attempt, of } => {
                write!(f, "Looking for your iPhone (attempt {} of {})...", attempt, of)
            }
            DiscoveryStatus::StrategyFinished {
                strategy, outcome, ..
            } => match outcome {
                StrategyOutcome::NoCandidate => write!(f, "{}: nothing found", strategy),
                StrategyOutcome::Rejected(path) => write!(
                    f,
                    "{}: '{}' does not look like an iPhone",
                    strategy,
                    path.display()
                ),
                StrategyOutcome::Accepted(path) => {
                    write!(f, "{}: found iPhone storage at '{}'", strategy, path.display())
                }
            },
            DiscoveryStatus::AccessDenied { path } => write!(
                f,
                "'{}' cannot be read. Unlock your iPhone and tap 'Trust' on the device.",
                path.display()
            ),
            DiscoveryStatus::BusSignal { name, present: true } => write!(
                f,
                "{}: an Apple device is connected, but its storage is not visible yet. \
                 Unlock it and tap 'Trust' if asked.",
                name
            ),
            DiscoveryStatus::BusSignal { name, present: false } => write!(
                f,
                "{}: no Apple device detected. Check the cable and connection.",
                name
            ),
            DiscoveryStatus::Retrying { delay } => {
                write!(f, "Retrying in {:.1}s...", delay.as_secs_f32())
            }
            DiscoveryStatus::Exhausted { attempts } => write!(
                f,
                "No iPhone found after {} attempt(s). You can enter the path manually.",
                attempts
            ),
            DiscoveryStatus::Cancelled => write!(f, "Detection cancelled"),
        }
    }
}

/// Terminal result of a discovery session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Found(MediaSourceHandle),
    Exhausted { attempts: u32, probes_run: usize },
    Cancelled,
}

impl DiscoveryOutcome {
    /// The handle, if one was found
    pub fn handle(&self) -> Option<&MediaSourceHandle> {
        match self {
            DiscoveryOutcome::Found(handle) => Some(handle),
            _ => None,
        }
    }
}

/// The discovery orchestrator
pub struct Discovery {
    strategies: Vec<Box<dyn ProbeStrategy>>,
    bus_signal: Option<Box<dyn BusSignal>>,
    policy: RetryPolicy,
    ctx: ProbeContext,
    cancel: CancellationToken,
    state: DiscoveryState,
    listable: fn(&Path) -> bool,
}

impl Discovery {
    /// Create an orchestrator over the given strategy table
    pub fn new(strategies: Vec<Box<dyn ProbeStrategy>>) -> Self {
        Self {
            strategies,
            bus_signal: None,
            policy: RetryPolicy::default(),
            ctx: ProbeContext::default(),
            cancel: CancellationToken::new(),
            state: DiscoveryState::Idle,
            listable: is_listable,
        }
    }

    /// Create an orchestrator with this platform's strategy table
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        let mut discovery = Self::new(platform_strategies(&config.extra_search_paths))
            .with_policy(config.retry_policy())
            .with_context(ProbeContext::new(
                Verifier::with_scan_limit(config.verify_scan_limit),
                config.command_timeout(),
            ));
        discovery.bus_signal = platform_bus_signal();
        discovery
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_context(mut self, ctx: ProbeContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_bus_signal(mut self, signal: Box<dyn BusSignal>) -> Self {
        self.bus_signal = Some(signal);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the check that a found root can be listed
    #[cfg(test)]
    pub(crate) fn with_access_check(mut self, check: fn(&Path) -> bool) -> Self {
        self.listable = check;
        self
    }

    /// Current state of the session
    pub fn state(&self) -> &DiscoveryState {
        &self.state
    }

    /// Names of the registered strategies, in probe order
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// The retry policy in effect
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run a discovery session to completion
    ///
    /// `on_status` receives a diagnostic after each strategy and between
    /// attempts. The session ends in `Found`, `Exhausted` or `Cancelled`.
    pub fn run<F>(&mut self, mut on_status: F) -> DiscoveryOutcome
    where
        F: FnMut(&DiscoveryStatus),
    {
        self.transition(DiscoveryState::Idle);

        let attempts = self.policy.attempts.max(1);
        let mut probes_run = 0usize;

        for attempt in 1..=attempts {
            if self.cancel.is_cancelled() {
                return self.cancelled(&mut on_status);
            }
            on_status(&DiscoveryStatus::AttemptStarted {
                attempt,
                of: attempts,
            });

            for index in 0..self.strategies.len() {
                if self.cancel.is_cancelled() {
                    return self.cancelled(&mut on_status);
                }
                self.transition(DiscoveryState::Probing { attempt, index });

                let strategy = &self.strategies[index];
                let result = strategy.probe(&self.ctx);
                probes_run += 1;
                let name = strategy.name().to_string();
                let transport = strategy.transport();

                let outcome = match result {
                    ProbeResult::NoCandidate => StrategyOutcome::NoCandidate,
                    ProbeResult::Candidate(path) | ProbeResult::CandidateVerified(path)
                        if path.as_os_str().is_empty() =>
                    {
                        StrategyOutcome::Rejected(path)
                    }
                    ProbeResult::Candidate(path) => {
                        self.transition(DiscoveryState::Verifying {
                            attempt,
                            index,
                            candidate: path.clone(),
                        });
                        if self.ctx.verifier.verify(&path) {
                            StrategyOutcome::Accepted(path)
                        } else {
                            StrategyOutcome::Rejected(path)
                        }
                    }
                    ProbeResult::CandidateVerified(path) => {
                        self.transition(DiscoveryState::Verifying {
                            attempt,
                            index,
                            candidate: path.clone(),
                        });
                        // Verified by the strategy; only check it is still there.
                        if path.is_dir() {
                            StrategyOutcome::Accepted(path)
                        } else {
                            StrategyOutcome::Rejected(path)
                        }
                    }
                };

                debug!("Strategy '{}' -> {:?}", name, outcome);
                let status = DiscoveryStatus::StrategyFinished {
                    attempt,
                    strategy: name.clone(),
                    outcome: outcome.clone(),
                };
                on_status(&status);

                if let StrategyOutcome::Accepted(root) = outcome {
                    if !(self.listable)(&root) {
                        warn!("{} found but not listable", root.display());
                        on_status(&DiscoveryStatus::AccessDenied { path: root.clone() });
                    }
                    let handle = MediaSourceHandle::new(root, &name, transport);
                    info!("Found media source {}", handle);
                    self.transition(DiscoveryState::Found(handle.clone()));
                    return DiscoveryOutcome::Found(handle);
                }
            }

            if attempt < attempts {
                if !self.check_bus_signal(&mut on_status) {
                    info!("No device on the bus, giving up after attempt {}", attempt);
                    return self.exhausted(attempt, probes_run, &mut on_status);
                }
                on_status(&DiscoveryStatus::Retrying {
                    delay: self.policy.delay,
                });
                if !self.cancel.sleep(self.policy.delay) {
                    return self.cancelled(&mut on_status);
                }
            } else if let Some(signal) = &self.bus_signal {
                // Final hint for the user; does not change the outcome.
                let present = signal.device_present(&self.ctx);
                on_status(&DiscoveryStatus::BusSignal {
                    name: signal.name().to_string(),
                    present,
                });
            }
        }

        self.exhausted(attempts, probes_run, &mut on_status)
    }

    /// Consult the bus signal between attempts
    ///
    /// Returns `false` when retrying is pointless.
    fn check_bus_signal<F>(&self, on_status: &mut F) -> bool
    where
        F: FnMut(&DiscoveryStatus),
    {
        let Some(signal) = &self.bus_signal else {
            return true;
        };
        let present = signal.device_present(&self.ctx);
        on_status(&DiscoveryStatus::BusSignal {
            name: signal.name().to_string(),
            present,
        });
        present || !self.policy.require_bus_signal
    }

    fn exhausted<F>(&mut self, attempts: u32, probes_run: usize, on_status: &mut F) -> DiscoveryOutcome
    where
        F: FnMut(&DiscoveryStatus),
    {
        self.transition(DiscoveryState::Exhausted);
        on_status(&DiscoveryStatus::Exhausted { attempts });
        DiscoveryOutcome::Exhausted {
            attempts,
            probes_run,
        }
    }

    fn cancelled<F>(&mut self, on_status: &mut F) -> DiscoveryOutcome
    where
        F: FnMut(&DiscoveryStatus),
    {
        self.transition(DiscoveryState::Exhausted);
        on_status(&DiscoveryStatus::Cancelled);
        DiscoveryOutcome::Cancelled
    }

    fn transition(&mut self, next: DiscoveryState) {
        trace!("Discovery: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Verify a path typed in by the user and turn it into a handle
///
/// Uses the same predicate as automatic discovery.
pub fn submit_manual_path(
    path: &Path,
    verifier: &Verifier,
) -> Result<MediaSourceHandle, VerificationError> {
    let metadata = fs::metadata(path).map_err(|_| VerificationError::NotFound(path.to_path_buf()))?;
    if !metadata.is_dir() {
        return Err(VerificationError::NotADirectory(path.to_path_buf()));
    }

    match verifier.inspect(path) {
        Verification::Rejected(reason) => Err(VerificationError::Rejected {
            path: path.to_path_buf(),
            reason,
        }),
        evidence => {
            debug!("Manual path {} accepted: {:?}", path.display(), evidence);
            Ok(MediaSourceHandle::new(
                path.to_path_buf(),
                MANUAL_STRATEGY_NAME,
                Transport::Manual,
            ))
        }
    }
}

/// Whether the root and its media folder can be listed
pub(crate) fn is_listable(root: &Path) -> bool {
    let target = Verifier::media_dir(root).unwrap_or_else(|| root.to_path_buf());
    match fs::read_dir(&target) {
        Ok(_) => true,
        Err(e) => {
            debug!("Cannot list {}: {}", target.display(), e);
            false
        }
    }
}
