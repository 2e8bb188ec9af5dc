//! Scripted probe strategies and bus signals
//!
//! Each mock counts its invocations so tests can check exactly how often
//! the orchestrator called it.

use crate::device::traits::{BusSignal, ProbeContext, ProbeResult, ProbeStrategy, Transport};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared invocation counter
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Probe that replays a fixed script of results
///
/// Once the script runs out, the fallback result is returned forever.
#[derive(Debug)]
pub struct ScriptedProbe {
    name: String,
    script: Mutex<VecDeque<ProbeResult>>,
    fallback: ProbeResult,
    calls: CallCounter,
}

impl ScriptedProbe {
    fn with_script(name: &str, script: Vec<ProbeResult>, fallback: ProbeResult) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            fallback,
            calls: CallCounter::default(),
        }
    }

    /// Always reports nothing
    pub fn nothing(name: &str) -> Self {
        Self::with_script(name, Vec::new(), ProbeResult::NoCandidate)
    }

    /// Always reports the same unverified candidate
    pub fn candidate(name: &str, path: PathBuf) -> Self {
        Self::with_script(name, Vec::new(), ProbeResult::Candidate(path))
    }

    /// Reports `results` in order, then nothing
    pub fn sequence(name: &str, results: Vec<ProbeResult>) -> Self {
        Self::with_script(name, results, ProbeResult::NoCandidate)
    }

    /// Counter of `probe` calls, usable after the probe was moved away
    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl ProbeStrategy for ScriptedProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport(&self) -> Transport {
        Transport::Simulated
    }

    fn probe(&self, _ctx: &ProbeContext) -> ProbeResult {
        self.calls.bump();
        let next = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(_) => None,
        };
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Bus signal with a fixed answer
#[derive(Debug, Clone)]
pub struct ScriptedSignal {
    present: bool,
    calls: CallCounter,
}

impl ScriptedSignal {
    pub fn new(present: bool) -> Self {
        Self {
            present,
            calls: CallCounter::default(),
        }
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl BusSignal for ScriptedSignal {
    fn name(&self) -> &str {
        "Scripted USB"
    }

    fn device_present(&self, _ctx: &ProbeContext) -> bool {
        self.calls.bump();
        self.present
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_then_fallback() {
        let probe = ScriptedProbe::sequence(
            "seq",
            vec![ProbeResult::Candidate(PathBuf::from("/a"))],
        );
        let ctx = ProbeContext::default();
        assert_eq!(probe.probe(&ctx), ProbeResult::Candidate(PathBuf::from("/a")));
        assert_eq!(probe.probe(&ctx), ProbeResult::NoCandidate);
        assert_eq!(probe.calls().get(), 2);
    }
}
