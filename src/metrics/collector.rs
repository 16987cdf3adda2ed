use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::http::ErrorKind;

use super::histogram::LatencyHistogram;
use super::types::{AggregateMetrics, CheckTally, LatencySummary, RunProgress, Sample};

/// Sample channel depth. Workers block on a full channel (backpressure)
/// rather than drop samples, which keeps the final counts exact.
const SAMPLE_CHANNEL_CAPACITY: usize = 1024;

/// Interval between live progress updates on the watch channel.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[must_use]
pub fn sample_channel() -> (mpsc::Sender<Sample>, mpsc::Receiver<Sample>) {
    mpsc::channel(SAMPLE_CHANNEL_CAPACITY)
}

struct AggregationState {
    total_requests: u64,
    timeouts: u64,
    connection_errors: u64,
    dns_errors: u64,
    status_counts: BTreeMap<u16, u64>,
    check_tallies: BTreeMap<Arc<str>, CheckTally>,
    checks_failed: u64,
    latency_sum_ms: u128,
    min_latency_ms: u64,
    max_latency_ms: u64,
    histogram: Option<LatencyHistogram>,
}

impl AggregationState {
    fn new(check_names: &[Arc<str>]) -> Self {
        let histogram = match LatencyHistogram::new() {
            Ok(histogram) => Some(histogram),
            Err(err) => {
                warn!("Failed to initialize latency histogram: {}", err);
                None
            }
        };
        // Pre-registered names keep reporting stable even when a check's
        // request never runs.
        let check_tallies = check_names
            .iter()
            .map(|name| (Arc::clone(name), CheckTally::default()))
            .collect();

        Self {
            total_requests: 0,
            timeouts: 0,
            connection_errors: 0,
            dns_errors: 0,
            status_counts: BTreeMap::new(),
            check_tallies,
            checks_failed: 0,
            latency_sum_ms: 0,
            min_latency_ms: u64::MAX,
            max_latency_ms: 0,
            histogram,
        }
    }

    fn record(&mut self, sample: &Sample) {
        self.total_requests = self.total_requests.saturating_add(1);

        let latency_ms = u64::try_from(sample.outcome.latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_sum_ms = self.latency_sum_ms.saturating_add(u128::from(latency_ms));
        self.min_latency_ms = self.min_latency_ms.min(latency_ms);
        self.max_latency_ms = self.max_latency_ms.max(latency_ms);
        if let Some(histogram) = self.histogram.as_mut()
            && let Err(err) = histogram.record(latency_ms)
        {
            warn!("Failed to record latency: {}", err);
        }

        match sample.outcome.error {
            ErrorKind::None => {
                if let Some(status) = sample.outcome.status {
                    let count = self.status_counts.entry(status).or_default();
                    *count = count.saturating_add(1);
                }
            }
            ErrorKind::Timeout => self.timeouts = self.timeouts.saturating_add(1),
            ErrorKind::Connection => {
                self.connection_errors = self.connection_errors.saturating_add(1);
            }
            ErrorKind::Dns => self.dns_errors = self.dns_errors.saturating_add(1),
        }

        for check in &sample.checks {
            let tally = self
                .check_tallies
                .entry(Arc::clone(&check.name))
                .or_default();
            if check.passed {
                tally.passed = tally.passed.saturating_add(1);
            } else {
                tally.failed = tally.failed.saturating_add(1);
                self.checks_failed = self.checks_failed.saturating_add(1);
            }
        }
    }

    const fn total_failures(&self) -> u64 {
        self.timeouts
            .saturating_add(self.connection_errors)
            .saturating_add(self.dns_errors)
    }

    fn snapshot(&self) -> AggregateMetrics {
        let (p50_ms, p90_ms, p95_ms, p99_ms) = self
            .histogram
            .as_ref()
            .map_or((0, 0, 0, 0), LatencyHistogram::percentiles);
        let mean_ms = if self.total_requests > 0 {
            let mean = self
                .latency_sum_ms
                .checked_div(u128::from(self.total_requests))
                .unwrap_or(0);
            u64::try_from(mean).map_or(u64::MAX, |value| value)
        } else {
            0
        };
        let min_ms = if self.total_requests > 0 {
            self.min_latency_ms
        } else {
            0
        };

        AggregateMetrics {
            total_requests: self.total_requests,
            timeouts: self.timeouts,
            connection_errors: self.connection_errors,
            dns_errors: self.dns_errors,
            status_counts: self.status_counts.clone(),
            checks: self
                .check_tallies
                .iter()
                .map(|(name, tally)| (String::from(name.as_ref()), *tally))
                .collect(),
            latency: LatencySummary {
                min_ms,
                max_ms: self.max_latency_ms,
                mean_ms,
                p50_ms,
                p90_ms,
                p95_ms,
                p99_ms,
            },
        }
    }
}

/// Spawns the single-writer aggregation task.
///
/// The task owns all mutable metrics state; every VU records through the
/// sample channel. It finishes and returns the frozen snapshot once every
/// sender has been dropped, which drains the channel exactly: nothing
/// sent before the last sender drop is lost.
#[must_use]
pub fn setup_metrics_collector(
    run_start: Instant,
    mut sample_rx: mpsc::Receiver<Sample>,
    progress_tx: watch::Sender<RunProgress>,
    check_names: Vec<Arc<str>>,
) -> JoinHandle<AggregateMetrics> {
    tokio::spawn(async move {
        let mut state = AggregationState::new(&check_names);
        let mut progress_interval = tokio::time::interval(PROGRESS_INTERVAL);
        progress_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe_sample = sample_rx.recv() => {
                    match maybe_sample {
                        Some(sample) => state.record(&sample),
                        None => break,
                    }
                }
                _ = progress_interval.tick() => {
                    let progress = RunProgress {
                        elapsed: run_start.elapsed(),
                        total_requests: state.total_requests,
                        total_failures: state.total_failures(),
                        checks_failed: state.checks_failed,
                    };
                    debug!(
                        "progress: {} requests, {} failures, {} failed checks",
                        progress.total_requests, progress.total_failures, progress.checks_failed
                    );
                    drop(progress_tx.send(progress));
                }
            }
        }

        state.snapshot()
    })
}
