//! Outcome tracking
//!
//! Both counters sit behind one mutex so any snapshot satisfies
//! `total == successes + failures`.

use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

/// Terminal classification of one unit of work (batch, update, conversion chain)
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Accepted; carries the decoded response body when it parsed
    Succeeded(Option<serde_json::Value>),
    /// No response or non-success status
    TransportFailed { status: Option<u16>, body: String },
    /// Well-formed response carrying an error collection
    ApplicationRejected { errors: serde_json::Value, body: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Outcome::Succeeded(payload) => payload.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Counts {
    total: u64,
    successes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeSummary {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
}

impl fmt::Display for OutcomeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OK: {} FAIL: {} TOTAL: {}", self.successes, self.failures, self.total)
    }
}

#[derive(Debug, Default)]
pub struct OutcomeTracker {
    counts: Mutex<Counts>,
}

impl OutcomeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn counts(&self) -> std::sync::MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn increment_total(&self) {
        self.counts().total += 1;
    }

    pub fn increment_success(&self) {
        self.counts().successes += 1;
    }

    /// Count a finished unit of work
    pub fn record(&self, outcome: &Outcome) {
        if outcome.is_success() {
            self.increment_success();
        }
    }

    pub fn total(&self) -> u64 {
        self.counts().total
    }

    pub fn successes(&self) -> u64 {
        self.counts().successes
    }

    pub fn failures(&self) -> u64 {
        self.snapshot().failures
    }

    pub fn snapshot(&self) -> OutcomeSummary {
        let counts = self.counts();
        OutcomeSummary {
            total: counts.total,
            successes: counts.successes,
            failures: counts.total.saturating_sub(counts.successes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_failures_derived() {
        let tracker = OutcomeTracker::new();
        for _ in 0..5 {
            tracker.increment_total();
        }
        tracker.record(&Outcome::Succeeded(None));
        tracker.record(&Outcome::TransportFailed { status: Some(500), body: String::new() });
        tracker.increment_success();

        let summary = tracker.snapshot();
        assert_eq!(summary, OutcomeSummary { total: 5, successes: 2, failures: 3 });
        assert_eq!(summary.to_string(), "OK: 2 FAIL: 3 TOTAL: 5");
    }

    #[test]
    fn test_concurrent_updates_not_lost() {
        let tracker = Arc::new(OutcomeTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        tracker.increment_total();
                        if (i + worker) % 3 != 0 {
                            tracker.increment_success();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = tracker.snapshot();
        assert_eq!(summary.total, 8000);
        assert_eq!(summary.total, summary.successes + summary.failures);
    }
}
