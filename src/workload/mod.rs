mod checks;


pub use checks::{CheckPredicate, CheckResult, CheckSpec, PredicateFn, evaluate_checks};

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::args::{HttpMethod, PositiveU64, PositiveUsize};

/// Immutable run plan, built once by config validation before any VU is
/// spawned.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub vus: PositiveUsize,
    pub stop: StopCondition,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub think_time: Option<Duration>,
    pub grace_period: Duration,
    pub requests: Vec<RequestSpec>,
}

impl RunConfig {
    /// Every check name in workload order, used to pre-register zero
    /// tallies so reporting stays stable across runs.
    #[must_use]
    pub fn check_names(&self) -> Vec<Arc<str>> {
        self.requests
            .iter()
            .flat_map(|request| request.checks.iter().map(|check| Arc::clone(&check.name)))
            .collect()
    }
}

/// The run's stop condition: a wall-clock deadline or an iteration budget
/// shared across all VUs. Exactly one is active per run.
#[derive(Debug, Clone, Copy)]
pub enum StopCondition {
    Duration(Duration),
    Iterations(PositiveU64),
}

/// One request of the workload body, with its URL fully resolved (base URL
/// joined, query parameters applied).
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub name: Option<String>,
    pub method: HttpMethod,
    pub url: Url,
    pub checks: Vec<CheckSpec>,
}

impl RequestSpec {
    #[must_use]
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.url.as_str())
    }
}
