use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use reqwest::Client;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::debug;

use crate::http;
use crate::metrics::Sample;
use crate::shutdown::{ShutdownReceiver, ShutdownSender, stop_requested};
use crate::workload::{RunConfig, evaluate_checks};

use super::budget::IterationBudget;

/// VU lifecycle states. The scheduler reads these as snapshots; everything
/// else about a VU is owned exclusively by its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VuStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl VuStatus {
    const fn as_u8(self) -> u8 {
        match self {
            VuStatus::Starting => 0,
            VuStatus::Running => 1,
            VuStatus::Stopping => 2,
            VuStatus::Stopped => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => VuStatus::Starting,
            1 => VuStatus::Running,
            2 => VuStatus::Stopping,
            _ => VuStatus::Stopped,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            VuStatus::Starting => "starting",
            VuStatus::Running => "running",
            VuStatus::Stopping => "stopping",
            VuStatus::Stopped => "stopped",
        }
    }
}

#[derive(Debug)]
pub struct VuState {
    id: u64,
    iterations: AtomicU64,
    status: AtomicU8,
}

impl VuState {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self {
            id,
            iterations: AtomicU64::new(0),
            status: AtomicU8::new(VuStatus::Starting.as_u8()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn snapshot(&self) -> VuSnapshot {
        VuSnapshot {
            id: self.id,
            iterations: self.iterations.load(Ordering::Relaxed),
            status: VuStatus::from_u8(self.status.load(Ordering::Relaxed)),
        }
    }

    fn set_status(&self, status: VuStatus) {
        self.status.store(status.as_u8(), Ordering::Relaxed);
    }

    fn bump_iterations(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }
}

/// Read-only view of one VU for monitoring.
#[derive(Debug, Clone, Copy)]
pub struct VuSnapshot {
    pub id: u64,
    pub iterations: u64,
    pub status: VuStatus,
}

pub(super) struct VuContext {
    pub(super) config: Arc<RunConfig>,
    pub(super) client: Client,
    pub(super) budget: Option<Arc<IterationBudget>>,
    pub(super) sample_tx: mpsc::Sender<Sample>,
}

/// Runs one virtual user until the stop signal fires.
///
/// The stop signal is polled at iteration boundaries only, so an in-flight
/// request always completes or hits its own timeout. The think-time sleep
/// is interruptible, keeping cancellation latency bounded. Failures inside
/// an iteration are recorded into metrics and never abort the VU.
pub(super) async fn vu_loop(
    state: Arc<VuState>,
    context: VuContext,
    shutdown_tx: ShutdownSender,
    mut shutdown_rx: ShutdownReceiver,
) {
    state.set_status(VuStatus::Running);

    loop {
        if stop_requested(&mut shutdown_rx) {
            state.set_status(VuStatus::Stopping);
            break;
        }
        if let Some(budget) = context.budget.as_deref()
            && !budget.try_claim(&shutdown_tx)
        {
            state.set_status(VuStatus::Stopping);
            break;
        }

        for request in &context.config.requests {
            let outcome = http::execute(&context.client, request).await;
            let checks = evaluate_checks(&outcome, &request.checks);
            let sample = Sample { outcome, checks };
            if context.sample_tx.send(sample).await.is_err() {
                // Collector is gone; nothing left to record into.
                state.set_status(VuStatus::Stopped);
                return;
            }
        }
        state.bump_iterations();

        if let Some(think_time) = context.config.think_time {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    state.set_status(VuStatus::Stopping);
                    break;
                }
                () = sleep(think_time) => {}
            }
        }
    }

    debug!(
        "VU {} stopped after {} iterations",
        state.id(),
        state.snapshot().iterations
    );
    state.set_status(VuStatus::Stopped);
}
