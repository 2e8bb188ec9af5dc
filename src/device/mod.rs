//! Device discovery module
//!
//! Locates the storage root of a connected iPhone without talking to the
//! device directly. Everything goes through facilities the OS already
//! provides: mounted volumes, OS queries and partition listings.
//!
//! # Submodules
//!
//! - `traits` - Probe abstractions and the verified `MediaSourceHandle`
//! - `verify` - The verification predicate for candidate roots
//! - `strategies` - Platform probe implementations and the strategy table
//! - `discovery` - The orchestrator with retries and manual path entry
//! - `command` - Time-bounded execution of OS utilities
//!
//! # Architecture
//!
//! Probes implement [`ProbeStrategy`] and report failure as
//! [`ProbeResult::NoCandidate`]. The [`Discovery`] orchestrator runs them in
//! order, verifies each candidate, and produces a [`MediaSourceHandle`] for
//! the first one that passes. Test doubles in `testdb` implement the same
//! traits.

pub mod command;
pub mod discovery;
pub mod strategies;
pub mod traits;
pub mod verify;

pub use discovery::{
    submit_manual_path, Discovery, DiscoveryOutcome, DiscoveryState, DiscoveryStatus,
    RetryPolicy, StrategyOutcome,
};
pub use traits::{BusSignal, MediaSourceHandle, ProbeContext, ProbeResult, ProbeStrategy, Transport};
pub use verify::{Verification, Verifier};
