use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::http::RequestOutcome;
use crate::workload::CheckResult;

/// One recorded request: the outcome plus the check results tied to it.
/// Consumed by the collector, then discarded.
#[derive(Debug, Clone)]
pub struct Sample {
    pub outcome: RequestOutcome,
    pub checks: Vec<CheckResult>,
}

/// Pass/fail tally for one named check.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CheckTally {
    pub passed: u64,
    pub failed: u64,
}

impl CheckTally {
    #[must_use]
    pub const fn evaluations(self) -> u64 {
        self.passed.saturating_add(self.failed)
    }
}

/// Latency distribution summary in milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LatencySummary {
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: u64,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

/// Frozen aggregate snapshot, produced once the collector has drained
/// every sample. `total_requests` always equals the sum of the status
/// tallies plus the three failure tallies.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateMetrics {
    pub total_requests: u64,
    pub timeouts: u64,
    pub connection_errors: u64,
    pub dns_errors: u64,
    pub status_counts: BTreeMap<u16, u64>,
    pub checks: BTreeMap<String, CheckTally>,
    pub latency: LatencySummary,
}

impl AggregateMetrics {
    #[must_use]
    pub const fn total_failures(&self) -> u64 {
        self.timeouts
            .saturating_add(self.connection_errors)
            .saturating_add(self.dns_errors)
    }
}

/// Live progress published on the watch channel while the run is active.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunProgress {
    pub elapsed: Duration,
    pub total_requests: u64,
    pub total_failures: u64,
    pub checks_failed: u64,
}
