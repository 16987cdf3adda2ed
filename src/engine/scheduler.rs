use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{info, warn};

use crate::error::{AppError, AppResult, MetricsError};
use crate::http;
use crate::metrics::{AggregateMetrics, RunProgress, sample_channel, setup_metrics_collector};
use crate::shutdown::{ShutdownSender, shutdown_channel};
use crate::workload::{RunConfig, StopCondition};

use super::budget::IterationBudget;
use super::vu::{VuContext, VuSnapshot, VuState, vu_loop};

/// Spawns the metrics collector, the deadline watchdog (duration mode),
/// and exactly `config.vus` VU loops. Constant concurrency: every VU
/// starts immediately, no ramp-up curve.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn start(config: RunConfig) -> AppResult<RunHandle> {
    let config = Arc::new(config);
    let client = http::build_client(&config)?;
    let (shutdown_tx, _) = shutdown_channel();
    let (sample_tx, sample_rx) = sample_channel();
    let (progress_tx, progress_rx) = watch::channel(RunProgress::default());

    let started = Instant::now();
    let collector = setup_metrics_collector(started, sample_rx, progress_tx, config.check_names());

    let budget = match config.stop {
        StopCondition::Iterations(count) => Some(Arc::new(IterationBudget::new(count.get()))),
        StopCondition::Duration(_) => None,
    };

    // Each VU owns a clone of the sample sender and of the done sender;
    // the scheduler keeps neither, so the collector sees channel closure
    // exactly when the last VU stops.
    let (vu_done_tx, vu_done_rx) = mpsc::channel::<()>(1);
    let vu_count = config.vus.get();
    let mut states = Vec::with_capacity(vu_count);
    let mut handles = Vec::with_capacity(vu_count);
    for index in 0..vu_count {
        let state = Arc::new(VuState::new(index as u64));
        let context = VuContext {
            config: Arc::clone(&config),
            client: client.clone(),
            budget: budget.clone(),
            sample_tx: sample_tx.clone(),
        };
        let vu_shutdown_tx = shutdown_tx.clone();
        let vu_shutdown_rx = shutdown_tx.subscribe();
        let vu_done_tx = vu_done_tx.clone();
        let vu_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            vu_loop(vu_state, context, vu_shutdown_tx, vu_shutdown_rx).await;
            drop(vu_done_tx);
        });
        states.push(state);
        handles.push(handle);
    }
    drop(sample_tx);
    drop(vu_done_tx);

    // Spawned after the VU receivers exist, so even a near-zero deadline
    // cannot fire before every VU can observe it.
    if let StopCondition::Duration(duration) = config.stop {
        spawn_deadline_watchdog(&shutdown_tx, duration);
    }

    info!("Started {} VUs", vu_count);

    Ok(RunHandle {
        grace_period: config.grace_period,
        shutdown_tx,
        collector,
        vu_done_rx,
        states,
        handles,
        progress_rx,
        started,
    })
}

fn spawn_deadline_watchdog(shutdown_tx: &ShutdownSender, duration: Duration) {
    let shutdown_tx = shutdown_tx.clone();
    drop(tokio::spawn(async move {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::select! {
            _ = shutdown_rx.recv() => {}
            () = sleep(duration) => {
                drop(shutdown_tx.send(()));
            }
        }
    }));
}

/// Handle over a started run.
pub struct RunHandle {
    grace_period: Duration,
    shutdown_tx: ShutdownSender,
    collector: JoinHandle<AggregateMetrics>,
    vu_done_rx: mpsc::Receiver<()>,
    states: Vec<Arc<VuState>>,
    handles: Vec<JoinHandle<()>>,
    progress_rx: watch::Receiver<RunProgress>,
    started: Instant,
}

/// Outcome of a completed run: the frozen metrics snapshot plus shutdown
/// bookkeeping.
#[derive(Debug)]
pub struct RunSummary {
    pub metrics: AggregateMetrics,
    pub elapsed: Duration,
    pub abandoned_vus: Vec<u64>,
    pub vu_snapshots: Vec<VuSnapshot>,
}

impl RunHandle {
    /// Sets the stop signal immediately. Safe to call any number of times.
    pub fn cancel(&self) {
        drop(self.shutdown_tx.send(()));
    }

    /// Sender for external cancellation sources (signal handlers).
    #[must_use]
    pub fn shutdown_sender(&self) -> ShutdownSender {
        self.shutdown_tx.clone()
    }

    /// Live progress receiver, updated at a fixed interval by the
    /// collector.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<RunProgress> {
        self.progress_rx.clone()
    }

    /// Monitoring snapshots of every VU.
    #[must_use]
    pub fn vu_snapshots(&self) -> Vec<VuSnapshot> {
        self.states.iter().map(|state| state.snapshot()).collect()
    }

    /// Waits for the stop condition, grace-waits the VUs, and returns the
    /// final metrics snapshot.
    ///
    /// VUs still running once the grace period elapses are aborted; their
    /// in-flight results are discarded, not guessed at, and their ids are
    /// reported in the summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the collector task fails to join.
    pub async fn await_completion(mut self) -> AppResult<RunSummary> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        // Deadline expiry, budget exhaustion, and cancel() all arrive as
        // the stop signal; VUs exiting on their own close the done
        // channel instead.
        tokio::select! {
            _ = shutdown_rx.recv() => {}
            _ = self.vu_done_rx.recv() => {}
        }
        drop(self.shutdown_tx.send(()));

        let grace_deadline = Instant::now()
            .checked_add(self.grace_period)
            .unwrap_or_else(Instant::now);
        let mut abandoned_vus = Vec::new();
        for (state, handle) in self.states.iter().zip(self.handles.iter_mut()) {
            let remaining = grace_deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, &mut *handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("VU {} task failed: {}", state.id(), err),
                Err(_elapsed) => {
                    handle.abort();
                    abandoned_vus.push(state.id());
                }
            }
        }
        if !abandoned_vus.is_empty() {
            warn!(
                "{} VUs did not stop within the grace period and were abandoned: {:?}",
                abandoned_vus.len(),
                abandoned_vus
            );
        }

        let metrics = self.collector.await.map_err(|err| {
            AppError::metrics(MetricsError::External {
                context: "collector join",
                source: Box::new(err),
            })
        })?;

        let vu_snapshots = self.states.iter().map(|state| state.snapshot()).collect();
        Ok(RunSummary {
            metrics,
            elapsed: self.started.elapsed(),
            abandoned_vus,
            vu_snapshots,
        })
    }
}
