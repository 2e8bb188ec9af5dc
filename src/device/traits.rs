//! Probe abstractions for device discovery
//!
//! Every way of looking for an iPhone (mounted volumes, OS queries, partition
//! scans) is a [`ProbeStrategy`]. Strategies are registered into an ordered
//! table and run by the discovery orchestrator; both the platform strategies
//! and the scripted mocks in `testdb` implement the same trait, so the
//! orchestrator can be tested without a device.
//!
//! # Architecture
//!
//! - `ProbeStrategy` - resolves zero or one candidate root path
//! - `BusSignal` - reports whether a device is on the bus, never a path
//! - `ProbeResult` - explicit outcome of a probe, including "nothing found"
//! - `MediaSourceHandle` - a verified root, the only input a transfer accepts

use crate::device::verify::Verifier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a media source is attached to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// A path the user configured or typed in
    Manual,
    /// A volume mounted at a well-known location
    MountedVolume,
    /// A path reported by an OS shell or device-management query
    ShellNamespace,
    /// Found by scanning every mounted partition
    PartitionScan,
    /// Test double
    Simulated,
}

impl Transport {
    /// Get a human-readable name for this transport
    pub fn display_name(&self) -> &'static str {
        match self {
            Transport::Manual => "manual path",
            Transport::MountedVolume => "mounted volume",
            Transport::ShellNamespace => "OS query",
            Transport::PartitionScan => "partition scan",
            Transport::Simulated => "simulated",
        }
    }
}

impl Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Outcome of a single probe
///
/// A candidate path is only a claim; existence is re-checked later because
/// the device can be unplugged at any moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The strategy found nothing (or failed internally)
    NoCandidate,
    /// A path that still has to pass verification
    Candidate(PathBuf),
    /// A path the strategy already ran through the verifier
    CandidateVerified(PathBuf),
}

impl ProbeResult {
    /// Build a candidate, rejecting empty paths
    pub fn candidate<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        if path.as_os_str().is_empty() {
            ProbeResult::NoCandidate
        } else {
            ProbeResult::Candidate(path)
        }
    }

    /// Run `path` through the verifier and wrap the outcome
    pub fn verified(path: &Path, verifier: &Verifier) -> Self {
        if !path.as_os_str().is_empty() && verifier.verify(path) {
            ProbeResult::CandidateVerified(path.to_path_buf())
        } else {
            ProbeResult::NoCandidate
        }
    }

    /// Collapse a list of candidate paths into a single result
    ///
    /// A single path is handed back unverified; with several, each is
    /// verified in order and the first that passes wins.
    pub fn from_candidates(candidates: Vec<PathBuf>, verifier: &Verifier) -> Self {
        match candidates.len() {
            0 => ProbeResult::NoCandidate,
            1 => candidates
                .into_iter()
                .next()
                .map(ProbeResult::candidate)
                .unwrap_or(ProbeResult::NoCandidate),
            _ => candidates
                .iter()
                .map(|path| ProbeResult::verified(path, verifier))
                .find(|result| result.is_some())
                .unwrap_or(ProbeResult::NoCandidate),
        }
    }

    /// Whether this result carries a path
    pub fn is_some(&self) -> bool {
        !matches!(self, ProbeResult::NoCandidate)
    }

    /// Path carried by this result, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            ProbeResult::NoCandidate => None,
            ProbeResult::Candidate(p) | ProbeResult::CandidateVerified(p) => Some(p),
        }
    }
}

/// Shared inputs for strategies
#[derive(Debug, Clone)]
pub struct ProbeContext {
    /// The verification predicate, for strategies that check their own candidates
    pub verifier: Verifier,
    /// Hard bound for every external process a strategy launches
    pub command_timeout: Duration,
}

impl ProbeContext {
    /// Create a context with the given verifier and command timeout
    pub fn new(verifier: Verifier, command_timeout: Duration) -> Self {
        Self {
            verifier,
            command_timeout,
        }
    }
}

impl Default for ProbeContext {
    fn default() -> Self {
        Self::new(Verifier::default(), Duration::from_secs(10))
    }
}

/// One self-contained method of locating a media source root
///
/// Implementations must never panic or block without bound: internal failures
/// are reported as [`ProbeResult::NoCandidate`].
pub trait ProbeStrategy: Send + Sync {
    /// Short name shown in diagnostics
    fn name(&self) -> &str;

    /// How a source found by this strategy is attached
    fn transport(&self) -> Transport;

    /// Try to resolve a candidate root
    fn probe(&self, ctx: &ProbeContext) -> ProbeResult;
}

/// Low-level bus enumeration, used only to decide whether retrying is worthwhile
pub trait BusSignal: Send + Sync {
    /// Short name shown in diagnostics
    fn name(&self) -> &str;

    /// Whether a matching device appears to be attached
    fn device_present(&self, ctx: &ProbeContext) -> bool;
}

/// A verified media source root
///
/// Only the discovery orchestrator and manual path submission construct
/// handles, and only from paths that passed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaSourceHandle {
    root: PathBuf,
    strategy: String,
    transport: Transport,
    verified_at: DateTime<Utc>,
}

impl MediaSourceHandle {
    pub(crate) fn new(root: PathBuf, strategy: &str, transport: Transport) -> Self {
        Self {
            root,
            strategy: strategy.to_string(),
            transport,
            verified_at: Utc::now(),
        }
    }

    /// Root path of the media source (the parent of its DCIM folder)
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the strategy that found this source
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    /// How the source is attached
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// When the root passed verification
    pub fn verified_at(&self) -> DateTime<Utc> {
        self.verified_at
    }
}

impl Display for MediaSourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (via {}, {})",
            self.root.display(),
            self.strategy,
            self.transport
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::MediaTreeBuilder;

    #[test]
    fn test_candidate_rejects_empty_path() {
        assert_eq!(ProbeResult::candidate(""), ProbeResult::NoCandidate);
        assert_eq!(
            ProbeResult::candidate("/Volumes/iPhone"),
            ProbeResult::Candidate(PathBuf::from("/Volumes/iPhone"))
        );
    }

    #[test]
    fn test_from_candidates_single_is_unverified() {
        let verifier = Verifier::default();
        let result =
            ProbeResult::from_candidates(vec![PathBuf::from("/does/not/exist")], &verifier);
        assert_eq!(
            result,
            ProbeResult::Candidate(PathBuf::from("/does/not/exist"))
        );
    }

    #[test]
    fn test_from_candidates_picks_first_verified() {
        let empty = tempfile::tempdir().unwrap();
        let device = MediaTreeBuilder::new().apple_folder("100APPLE").build();

        let verifier = Verifier::default();
        let result = ProbeResult::from_candidates(
            vec![empty.path().to_path_buf(), device.root().to_path_buf()],
            &verifier,
        );
        assert_eq!(
            result,
            ProbeResult::CandidateVerified(device.root().to_path_buf())
        );
    }

    #[test]
    fn test_from_candidates_none_verified() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let verifier = Verifier::default();
        let result = ProbeResult::from_candidates(
            vec![a.path().to_path_buf(), b.path().to_path_buf()],
            &verifier,
        );
        assert_eq!(result, ProbeResult::NoCandidate);
    }

    #[test]
    fn test_handle_display() {
        let handle = MediaSourceHandle::new(
            PathBuf::from("/Volumes/iPhone"),
            "Mounted volumes",
            Transport::MountedVolume,
        );
        let display = handle.to_string();
        assert!(display.contains("/Volumes/iPhone"));
        assert!(display.contains("Mounted volumes"));
        assert_eq!(handle.transport(), Transport::MountedVolume);
    }
}
