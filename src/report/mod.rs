
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::RunSummary;
use crate::error::AppResult;
use crate::metrics::AggregateMetrics;

/// Aggregate metrics plus run metadata, returned to the caller and
/// optionally exported as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct FinalReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub vus: usize,
    pub metrics: AggregateMetrics,
    pub abandoned_vus: Vec<u64>,
    pub shutdown_timed_out: bool,
}

impl FinalReport {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>, vus: usize, summary: RunSummary) -> Self {
        let elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX);
        Self {
            started_at,
            elapsed_ms,
            vus,
            metrics: summary.metrics,
            shutdown_timed_out: !summary.abandoned_vus.is_empty(),
            abandoned_vus: summary.abandoned_vus,
        }
    }
}

/// Scaled integer rate: `part / whole` as a percentage times 100, so it
/// prints with two decimals without float math.
pub(crate) fn rate_x100(part: u64, whole: u64) -> u64 {
    if whole == 0 {
        return 0;
    }
    let scaled = u128::from(part)
        .saturating_mul(10_000)
        .checked_div(u128::from(whole))
        .unwrap_or(0);
    u64::try_from(scaled).map_or(u64::MAX, |value| value)
}

pub fn print_summary(report: &FinalReport) {
    let metrics = &report.metrics;
    let total = metrics.total_requests;
    let failures = metrics.total_failures();
    let failure_rate = rate_x100(failures, total);

    println!("Started: {}", report.started_at.to_rfc3339());
    println!(
        "Duration: {}.{:03}s",
        report.elapsed_ms / 1000,
        report.elapsed_ms % 1000
    );
    println!("VUs: {}", report.vus);
    println!("Total Requests: {}", total);
    println!(
        "Failures: {} ({}.{:02}%)",
        failures,
        failure_rate / 100,
        failure_rate % 100
    );
    println!("  Timeouts: {}", metrics.timeouts);
    println!("  Connection Errors: {}", metrics.connection_errors);
    println!("  DNS Errors: {}", metrics.dns_errors);

    if !metrics.status_counts.is_empty() {
        println!("Status Codes:");
        for (status, count) in &metrics.status_counts {
            println!("  {}: {}", status, count);
        }
    }

    if !metrics.checks.is_empty() {
        println!("Checks:");
        for (name, tally) in &metrics.checks {
            let evaluations = tally.evaluations();
            let pass_rate = rate_x100(tally.passed, evaluations);
            println!(
                "  {}: {}/{} ({}.{:02}%)",
                name,
                tally.passed,
                evaluations,
                pass_rate / 100,
                pass_rate % 100
            );
        }
    }

    let latency = metrics.latency;
    println!(
        "Min/Max/Mean Latency: {}ms / {}ms / {}ms",
        latency.min_ms, latency.max_ms, latency.mean_ms
    );
    println!(
        "P50/P90/P95/P99 Latency: {}ms / {}ms / {}ms / {}ms",
        latency.p50_ms, latency.p90_ms, latency.p95_ms, latency.p99_ms
    );

    if report.shutdown_timed_out {
        println!(
            "Warning: {} VUs abandoned after the grace period; their in-flight results are excluded.",
            report.abandoned_vus.len()
        );
    }
}

/// Writes the report as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_json(report: &FinalReport, path: &str) -> AppResult<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}
