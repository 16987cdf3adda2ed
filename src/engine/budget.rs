use std::sync::atomic::{AtomicU64, Ordering};

use crate::shutdown::ShutdownSender;

/// Iteration budget shared by every VU of a run. The VU that exhausts it
/// asserts the stop signal so the others wind down at their next iteration
/// boundary.
#[derive(Debug)]
pub struct IterationBudget {
    limit: u64,
    counter: AtomicU64,
}

impl IterationBudget {
    #[must_use]
    pub const fn new(limit: u64) -> Self {
        Self {
            limit,
            counter: AtomicU64::new(0),
        }
    }

    /// Claims one iteration. Returns false, after firing the stop signal,
    /// once the budget is spent.
    pub fn try_claim(&self, shutdown_tx: &ShutdownSender) -> bool {
        loop {
            let current = self.counter.load(Ordering::Relaxed);
            if current >= self.limit {
                drop(shutdown_tx.send(()));
                return false;
            }
            let Some(next) = current.checked_add(1) else {
                drop(shutdown_tx.send(()));
                return false;
            };
            if self
                .counter
                .compare_exchange(current, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    #[must_use]
    pub fn claimed(&self) -> u64 {
        self.counter.load(Ordering::Relaxed).min(self.limit)
    }
}
