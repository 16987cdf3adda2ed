use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::AppResult;
use crate::report::FinalReport;
use crate::shutdown::setup_signal_shutdown_handler;
use crate::workload::RunConfig;

use super::scheduler;

/// Runs a validated config to completion and assembles the final report.
///
/// External cancellation (SIGINT/SIGTERM) is wired into the scheduler's
/// cancel path, so an interrupted run still yields a best-effort report
/// from everything recorded up to the stop signal.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or an engine task
/// fails to join.
pub async fn run(config: RunConfig) -> AppResult<FinalReport> {
    let started_at: DateTime<Utc> = Utc::now();
    let vus = config.vus.get();

    let handle = scheduler::start(config)?;
    let signal_handle = setup_signal_shutdown_handler(&handle.shutdown_sender());

    let summary = handle.await_completion().await?;
    // The signal task also exits on the run's own stop signal.
    drop(signal_handle.await);

    info!(
        "Run finished: {} requests in {}ms",
        summary.metrics.total_requests,
        summary.elapsed.as_millis()
    );

    Ok(FinalReport::new(started_at, vus, summary))
}
