use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::http::RequestOutcome;

pub type PredicateFn = dyn Fn(&RequestOutcome) -> bool + Send + Sync;

/// A named boolean assertion over one request outcome. Checks are scored
/// for pass/fail rate and are never fatal.
#[derive(Debug, Clone)]
pub struct CheckSpec {
    pub name: Arc<str>,
    pub predicate: CheckPredicate,
}

impl CheckSpec {
    #[must_use]
    pub fn new(name: &str, predicate: CheckPredicate) -> Self {
        Self {
            name: Arc::from(name),
            predicate,
        }
    }
}

#[derive(Clone)]
pub enum CheckPredicate {
    /// Status code is one of the listed values.
    StatusIn(Vec<u16>),
    /// Status code lies in the inclusive range.
    StatusBetween { min: u16, max: u16 },
    /// Outcome latency is below the limit.
    LatencyUnder(Duration),
    /// The call produced a response at all (no network error or timeout).
    Succeeded,
    /// Caller-supplied predicate for library embedders.
    Custom(Arc<PredicateFn>),
}

impl CheckPredicate {
    #[must_use]
    pub fn evaluate(&self, outcome: &RequestOutcome) -> bool {
        match self {
            CheckPredicate::StatusIn(codes) => {
                outcome.status.is_some_and(|code| codes.contains(&code))
            }
            CheckPredicate::StatusBetween { min, max } => outcome
                .status
                .is_some_and(|code| code >= *min && code <= *max),
            CheckPredicate::LatencyUnder(limit) => outcome.latency < *limit,
            CheckPredicate::Succeeded => !outcome.error.is_failure(),
            CheckPredicate::Custom(predicate) => predicate(outcome),
        }
    }
}

impl fmt::Debug for CheckPredicate {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckPredicate::StatusIn(codes) => {
                formatter.debug_tuple("StatusIn").field(codes).finish()
            }
            CheckPredicate::StatusBetween { min, max } => formatter
                .debug_struct("StatusBetween")
                .field("min", min)
                .field("max", max)
                .finish(),
            CheckPredicate::LatencyUnder(limit) => {
                formatter.debug_tuple("LatencyUnder").field(limit).finish()
            }
            CheckPredicate::Succeeded => formatter.write_str("Succeeded"),
            CheckPredicate::Custom(_) => formatter.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: Arc<str>,
    pub passed: bool,
}

/// Evaluates every check against one outcome, in order.
///
/// A predicate that panics is caught, logged, and recorded as failed;
/// evaluation of the remaining checks continues.
#[must_use]
pub fn evaluate_checks(outcome: &RequestOutcome, checks: &[CheckSpec]) -> Vec<CheckResult> {
    checks
        .iter()
        .map(|check| {
            let evaluated = catch_unwind(AssertUnwindSafe(|| check.predicate.evaluate(outcome)));
            let passed = evaluated.unwrap_or_else(|_cause| {
                warn!("Check '{}' panicked; recorded as failed.", check.name);
                false
            });
            CheckResult {
                name: Arc::clone(&check.name),
                passed,
            }
        })
        .collect()
}
