use std::future::Future;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::{IterationBudget, start};
use crate::error::{AppError, AppResult};
use crate::metrics::AggregateMetrics;
use crate::shutdown::shutdown_channel;
use crate::workload::{
    CheckPredicate, CheckSpec, RequestSpec, RunConfig, StopCondition,
};
use crate::args::{HttpMethod, PositiveU64, PositiveUsize};

#[derive(Clone, Copy)]
enum ServerBehavior {
    Status(u16),
    DelayThenOk(Duration),
}

struct ServerHandle {
    shutdown: mpsc::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _send_result = self.shutdown.send(());
        if let Some(handle) = self.thread.take() {
            drop(handle.join());
        }
    }
}

fn spawn_http_server(behavior: ServerBehavior) -> Result<(String, ServerHandle), String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|err| format!("bind test server failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("server addr failed: {}", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| format!("set_nonblocking failed: {}", err))?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            match listener.accept() {
                Ok((stream, _)) => {
                    thread::spawn(move || handle_client(stream, behavior));
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(_) => break,
            }
        }
    });

    Ok((
        format!("http://{}", addr),
        ServerHandle {
            shutdown: shutdown_tx,
            thread: Some(handle),
        },
    ))
}

fn handle_client(mut stream: TcpStream, behavior: ServerBehavior) {
    let mut buffer = [0u8; 1024];
    if stream.read(&mut buffer).is_err() {
        return;
    }
    let status = match behavior {
        ServerBehavior::Status(status) => status,
        ServerBehavior::DelayThenOk(delay) => {
            thread::sleep(delay);
            200
        }
    };
    let response = format!(
        "HTTP/1.1 {} X\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK",
        status
    );
    if stream.write_all(response.as_bytes()).is_err() {
        return;
    }
    if stream.flush().is_err() {
        return;
    }
    drop(stream.shutdown(Shutdown::Both));
}

fn run_async_test<F>(future: F) -> AppResult<()>
where
    F: Future<Output = AppResult<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::validation(format!("Failed to build runtime: {}", err)))?;
    runtime.block_on(future)
}

struct TestRun {
    url: String,
    vus: usize,
    stop: StopCondition,
    checks: Vec<CheckSpec>,
    request_timeout: Duration,
    think_time: Option<Duration>,
    grace_period: Duration,
}

impl TestRun {
    fn new(url: &str, vus: usize, stop: StopCondition) -> Self {
        Self {
            url: url.to_owned(),
            vus,
            stop,
            checks: vec![CheckSpec::new(
                "status is 2xx",
                CheckPredicate::StatusBetween { min: 200, max: 299 },
            )],
            request_timeout: Duration::from_secs(2),
            think_time: None,
            grace_period: Duration::from_secs(2),
        }
    }

    fn into_config(self) -> AppResult<RunConfig> {
        Ok(RunConfig {
            vus: PositiveUsize::try_from(self.vus).map_err(AppError::validation)?,
            stop: self.stop,
            request_timeout: self.request_timeout,
            connect_timeout: Duration::from_millis(500),
            think_time: self.think_time,
            grace_period: self.grace_period,
            requests: vec![RequestSpec {
                name: None,
                method: HttpMethod::Get,
                url: self
                    .url
                    .parse()
                    .map_err(|err| AppError::validation(format!("bad url: {}", err)))?,
                checks: self.checks,
            }],
        })
    }
}

fn iterations(count: u64) -> AppResult<StopCondition> {
    Ok(StopCondition::Iterations(
        PositiveU64::try_from(count).map_err(AppError::validation)?,
    ))
}

fn accounted(metrics: &AggregateMetrics) -> u64 {
    metrics
        .status_counts
        .values()
        .fold(0u64, |sum, count| sum.saturating_add(*count))
        .saturating_add(metrics.total_failures())
}

#[test]
fn runs_exact_iteration_budget() -> AppResult<()> {
    let (url, _server) = spawn_http_server(ServerBehavior::Status(200))
        .map_err(AppError::validation)?;
    run_async_test(async {
        let config = TestRun::new(&url, 1, iterations(5)?).into_config()?;
        let handle = start(config)?;
        if handle.vu_snapshots().len() != 1 {
            return Err(AppError::validation("Expected exactly one VU"));
        }

        let summary = handle.await_completion().await?;
        if summary.metrics.total_requests != 5 {
            return Err(AppError::validation(format!(
                "Expected 5 requests, got {}",
                summary.metrics.total_requests
            )));
        }
        if summary.metrics.total_failures() != 0 {
            return Err(AppError::validation("Expected zero failures"));
        }
        if summary.metrics.status_counts.get(&200).copied() != Some(5) {
            return Err(AppError::validation("Expected 5 entries under status 200"));
        }
        let tally = summary
            .metrics
            .checks
            .get("status is 2xx")
            .ok_or_else(|| AppError::validation("Missing check tally"))?;
        if tally.passed != 5 || tally.failed != 0 {
            return Err(AppError::validation(format!(
                "Expected 5/0, got {}/{}",
                tally.passed, tally.failed
            )));
        }
        Ok(())
    })
}

#[test]
fn spawns_exactly_the_configured_vus() -> AppResult<()> {
    let (url, _server) = spawn_http_server(ServerBehavior::Status(200))
        .map_err(AppError::validation)?;
    run_async_test(async {
        let config = TestRun::new(&url, 4, iterations(8)?).into_config()?;
        let handle = start(config)?;
        if handle.vu_snapshots().len() != 4 {
            return Err(AppError::validation("Expected exactly four VUs"));
        }

        let summary = handle.await_completion().await?;
        if summary.vu_snapshots.len() != 4 {
            return Err(AppError::validation("Summary lost VU snapshots"));
        }
        let iterations_run: u64 = summary
            .vu_snapshots
            .iter()
            .fold(0u64, |sum, vu| sum.saturating_add(vu.iterations));
        if iterations_run != 8 {
            return Err(AppError::validation(format!(
                "Shared budget must cap iterations at 8, got {}",
                iterations_run
            )));
        }
        if summary.metrics.total_requests != 8 {
            return Err(AppError::validation(format!(
                "Expected 8 requests, got {}",
                summary.metrics.total_requests
            )));
        }
        if !summary.abandoned_vus.is_empty() {
            return Err(AppError::validation("No VU should be abandoned"));
        }
        Ok(())
    })
}

#[test]
fn duration_deadline_stops_the_run() -> AppResult<()> {
    let (url, _server) = spawn_http_server(ServerBehavior::Status(200))
        .map_err(AppError::validation)?;
    run_async_test(async {
        let mut run = TestRun::new(&url, 2, StopCondition::Duration(Duration::from_millis(300)));
        run.think_time = Some(Duration::from_millis(20));
        let handle = start(run.into_config()?)?;

        let summary = handle.await_completion().await?;
        if summary.metrics.total_requests == 0 {
            return Err(AppError::validation("Expected some requests before the deadline"));
        }
        if summary.elapsed > Duration::from_secs(5) {
            return Err(AppError::validation("Deadline shutdown took too long"));
        }
        if accounted(&summary.metrics) != summary.metrics.total_requests {
            return Err(AppError::validation(
                "Status + failure tallies must equal the total",
            ));
        }
        Ok(())
    })
}

#[test]
fn cancel_mid_run_yields_a_partial_consistent_report() -> AppResult<()> {
    let (url, _server) = spawn_http_server(ServerBehavior::Status(200))
        .map_err(AppError::validation)?;
    run_async_test(async {
        let mut run = TestRun::new(&url, 2, StopCondition::Duration(Duration::from_secs(30)));
        run.think_time = Some(Duration::from_millis(10));
        let handle = start(run.into_config()?)?;

        let cancel_tx = handle.shutdown_sender();
        drop(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            // cancel() is idempotent; a second signal must be harmless.
            drop(cancel_tx.send(()));
            drop(cancel_tx.send(()));
        }));

        let summary = handle.await_completion().await?;
        if summary.elapsed > Duration::from_secs(5) {
            return Err(AppError::validation("Cancellation took too long"));
        }
        if accounted(&summary.metrics) != summary.metrics.total_requests {
            return Err(AppError::validation(
                "Cancelled run must keep counts consistent",
            ));
        }
        if !summary.abandoned_vus.is_empty() {
            return Err(AppError::validation(
                "Fast responses should stop within the grace period",
            ));
        }
        Ok(())
    })
}

#[test]
fn cancel_is_immediate_and_idempotent() -> AppResult<()> {
    let (url, _server) = spawn_http_server(ServerBehavior::Status(200))
        .map_err(AppError::validation)?;
    run_async_test(async {
        let mut run = TestRun::new(&url, 1, StopCondition::Duration(Duration::from_secs(30)));
        run.think_time = Some(Duration::from_millis(5));
        let handle = start(run.into_config()?)?;
        let mut progress_rx = handle.progress();

        handle.cancel();
        handle.cancel();

        let summary = handle.await_completion().await?;
        if summary.elapsed > Duration::from_secs(5) {
            return Err(AppError::validation("Cancellation must not wait out the deadline"));
        }
        let progress = *progress_rx.borrow_and_update();
        if progress.total_requests > summary.metrics.total_requests {
            return Err(AppError::validation(
                "Live progress can never exceed the final total",
            ));
        }
        Ok(())
    })
}

#[test]
fn timeouts_are_classified_and_fail_status_checks() -> AppResult<()> {
    let (url, _server) = spawn_http_server(ServerBehavior::DelayThenOk(Duration::from_secs(1)))
        .map_err(AppError::validation)?;
    run_async_test(async {
        let mut run = TestRun::new(&url, 1, iterations(3)?);
        run.request_timeout = Duration::from_millis(100);
        let handle = start(run.into_config()?)?;

        let summary = handle.await_completion().await?;
        if summary.metrics.total_requests != 3 {
            return Err(AppError::validation(format!(
                "Expected 3 requests, got {}",
                summary.metrics.total_requests
            )));
        }
        if summary.metrics.timeouts != 3 {
            return Err(AppError::validation(format!(
                "Expected 3 timeouts, got {}",
                summary.metrics.timeouts
            )));
        }
        if !summary.metrics.status_counts.is_empty() {
            return Err(AppError::validation("Timeouts must not record status codes"));
        }
        let tally = summary
            .metrics
            .checks
            .get("status is 2xx")
            .ok_or_else(|| AppError::validation("Missing check tally"))?;
        if tally.passed != 0 || tally.failed != 3 {
            return Err(AppError::validation(
                "Status checks must fail on timed-out requests",
            ));
        }
        Ok(())
    })
}

#[test]
fn http_403_is_scored_by_checks_not_the_engine() -> AppResult<()> {
    let (url, _server) = spawn_http_server(ServerBehavior::Status(403))
        .map_err(AppError::validation)?;
    run_async_test(async {
        let mut run = TestRun::new(&url, 2, iterations(6)?);
        run.checks = vec![CheckSpec::new(
            "status is 2xx/3xx/401/403",
            CheckPredicate::StatusIn(vec![200, 201, 202, 204, 301, 302, 401, 403]),
        )];
        let handle = start(run.into_config()?)?;

        let summary = handle.await_completion().await?;
        if summary.metrics.total_requests != 6 {
            return Err(AppError::validation(format!(
                "Expected 6 requests, got {}",
                summary.metrics.total_requests
            )));
        }
        if summary.metrics.total_failures() != 0 {
            return Err(AppError::validation(
                "A 403 response is not an engine-level failure",
            ));
        }
        if summary.metrics.status_counts.get(&403).copied() != Some(6) {
            return Err(AppError::validation("Expected 6 entries under status 403"));
        }
        let tally = summary
            .metrics
            .checks
            .get("status is 2xx/3xx/401/403")
            .ok_or_else(|| AppError::validation("Missing check tally"))?;
        if tally.passed != 6 || tally.failed != 0 {
            return Err(AppError::validation("Permissive status check must pass 6/6"));
        }
        Ok(())
    })
}

#[test]
fn slow_in_flight_work_is_abandoned_after_the_grace_period() -> AppResult<()> {
    let (url, _server) = spawn_http_server(ServerBehavior::DelayThenOk(Duration::from_secs(2)))
        .map_err(AppError::validation)?;
    run_async_test(async {
        let mut run = TestRun::new(&url, 1, StopCondition::Duration(Duration::from_millis(100)));
        run.request_timeout = Duration::from_secs(5);
        run.grace_period = Duration::from_millis(100);
        let handle = start(run.into_config()?)?;

        let summary = handle.await_completion().await?;
        if summary.abandoned_vus.len() != 1 {
            return Err(AppError::validation(format!(
                "Expected one abandoned VU, got {:?}",
                summary.abandoned_vus
            )));
        }
        // The abandoned VU's in-flight request is discarded, not counted.
        if summary.metrics.total_requests != 0 {
            return Err(AppError::validation(
                "Abandoned in-flight results must be excluded",
            ));
        }
        if summary.elapsed > Duration::from_secs(1) {
            return Err(AppError::validation(
                "Shutdown latency must be bounded by the grace period",
            ));
        }
        Ok(())
    })
}

#[test]
fn iteration_budget_never_overspends() -> AppResult<()> {
    let budget = IterationBudget::new(100);
    let (shutdown_tx, mut shutdown_rx) = shutdown_channel();

    let mut claims = 0u64;
    for _ in 0..150 {
        if budget.try_claim(&shutdown_tx) {
            claims = claims.saturating_add(1);
        }
    }
    if claims != 100 {
        return Err(AppError::validation(format!(
            "Expected 100 claims, got {}",
            claims
        )));
    }
    if budget.claimed() != 100 {
        return Err(AppError::validation("Claimed counter out of bounds"));
    }
    if shutdown_rx.try_recv().is_err() {
        return Err(AppError::validation(
            "Exhausting the budget must fire the stop signal",
        ));
    }
    Ok(())
}
