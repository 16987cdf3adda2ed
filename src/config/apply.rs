use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::args::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_GRACE_PERIOD, DEFAULT_REQUEST_TIMEOUT, EngineArgs, HttpMethod,
    PositiveU64, PositiveUsize,
};
use crate::error::{AppError, AppResult, ConfigError, HttpError, ValidationError};
use crate::http::RequestOutcome;
use crate::workload::{CheckPredicate, CheckSpec, RequestSpec, RunConfig, StopCondition};

use super::types::{CheckConfig, ConfigFile, DurationValue, RequestConfig};

/// Check name synthesized for `--url` shortcut runs.
const DEFAULT_CHECK_NAME: &str = "status is 2xx";

/// Merges CLI flags over the workload file and validates the result into an
/// immutable run plan. Fails before any VU or client is created.
///
/// # Errors
///
/// Returns an error when a field is out of range, the stop condition is not
/// exactly one of duration/iterations, a URL is malformed, or a check is
/// declared without exactly one predicate.
pub fn build_run_config(args: &EngineArgs, file: Option<ConfigFile>) -> AppResult<RunConfig> {
    let file = file.unwrap_or_default();

    let vus = resolve_vus(args, &file)?;
    let stop = resolve_stop_condition(args, &file)?;
    let request_timeout = resolve_duration(
        args.timeout,
        file.timeout.as_ref(),
        "timeout",
        DEFAULT_REQUEST_TIMEOUT,
    )?;
    let connect_timeout = resolve_duration(
        args.connect_timeout,
        file.connect_timeout.as_ref(),
        "connect_timeout",
        DEFAULT_CONNECT_TIMEOUT,
    )?;
    let grace_period = resolve_duration(
        args.grace_period,
        file.grace_period.as_ref(),
        "grace_period",
        DEFAULT_GRACE_PERIOD,
    )?;
    let think_time = resolve_optional_duration(args.think_time, file.think_time.as_ref())?;

    let base_url = resolve_base_url(args, &file)?;
    let requests = resolve_requests(args, file.requests, base_url.as_ref())?;
    reject_duplicate_check_names(&requests)?;

    Ok(RunConfig {
        vus,
        stop,
        request_timeout,
        connect_timeout,
        think_time,
        grace_period,
        requests,
    })
}

fn resolve_vus(args: &EngineArgs, file: &ConfigFile) -> AppResult<PositiveUsize> {
    if let Some(vus) = args.vus {
        return Ok(vus);
    }
    match file.vus {
        Some(value) => PositiveUsize::try_from(value).map_err(|err| {
            AppError::config(ConfigError::FieldMustBePositive {
                field: "vus".to_owned(),
                source: err,
            })
        }),
        None => PositiveUsize::try_from(1).map_err(AppError::validation),
    }
}

fn resolve_stop_condition(args: &EngineArgs, file: &ConfigFile) -> AppResult<StopCondition> {
    // A CLI stop flag replaces the file's stop condition wholesale; clap
    // already rejects --duration together with --iterations.
    let (duration, iterations) = if args.duration.is_some() || args.iterations.is_some() {
        (args.duration, args.iterations)
    } else {
        let duration = file
            .duration
            .as_ref()
            .map(DurationValue::to_duration)
            .transpose()
            .map_err(|err| {
                AppError::config(ConfigError::InvalidDuration {
                    field: "duration",
                    source: err,
                })
            })?;
        let iterations = file
            .iterations
            .map(PositiveU64::try_from)
            .transpose()
            .map_err(|err| {
                AppError::config(ConfigError::FieldMustBePositive {
                    field: "iterations".to_owned(),
                    source: err,
                })
            })?;
        (duration, iterations)
    };

    match (duration, iterations) {
        (Some(_), Some(_)) => Err(AppError::config(ConfigError::Conflict {
            left: "duration",
            right: "iterations",
        })),
        (Some(duration), None) => Ok(StopCondition::Duration(duration)),
        (None, Some(iterations)) => Ok(StopCondition::Iterations(iterations)),
        (None, None) => Err(AppError::config(ConfigError::MissingStopCondition)),
    }
}

fn resolve_duration(
    cli: Option<Duration>,
    file: Option<&DurationValue>,
    field: &'static str,
    default: Duration,
) -> AppResult<Duration> {
    if let Some(value) = cli {
        return Ok(value);
    }
    match file {
        Some(value) => value
            .to_duration()
            .map_err(|err| AppError::config(ConfigError::InvalidDuration { field, source: err })),
        None => Ok(default),
    }
}

fn resolve_optional_duration(
    cli: Option<Duration>,
    file: Option<&DurationValue>,
) -> AppResult<Option<Duration>> {
    if let Some(value) = cli {
        return Ok(Some(value));
    }
    file.map(|value| {
        value.to_duration().map_err(|err| {
            AppError::config(ConfigError::InvalidDuration {
                field: "think_time",
                source: err,
            })
        })
    })
    .transpose()
}

fn resolve_base_url(args: &EngineArgs, file: &ConfigFile) -> AppResult<Option<Url>> {
    let Some(raw) = args.base_url.as_deref().or(file.base_url.as_deref()) else {
        return Ok(None);
    };
    let url = Url::parse(raw).map_err(|err| {
        AppError::validation(ValidationError::InvalidBaseUrl {
            url: raw.to_owned(),
            source: err,
        })
    })?;
    if url.host_str().is_none() {
        return Err(AppError::validation(ValidationError::BaseUrlMissingHost));
    }
    Ok(Some(url))
}

fn resolve_requests(
    args: &EngineArgs,
    file_requests: Option<Vec<RequestConfig>>,
    base_url: Option<&Url>,
) -> AppResult<Vec<RequestSpec>> {
    if let Some(raw) = args.url.as_deref() {
        if file_requests.as_ref().is_some_and(|requests| !requests.is_empty()) {
            return Err(AppError::config(ConfigError::Conflict {
                left: "--url",
                right: "[[requests]]",
            }));
        }
        let url = parse_target_url(raw)?;
        return Ok(vec![RequestSpec {
            name: None,
            method: args.method,
            url,
            checks: vec![default_status_check()],
        }]);
    }

    let requests = file_requests.unwrap_or_default();
    if requests.is_empty() {
        // A bare base_url still makes a runnable single-GET workload.
        let Some(base) = base_url else {
            return Err(AppError::validation(ValidationError::MissingTarget));
        };
        return Ok(vec![RequestSpec {
            name: None,
            method: args.method,
            url: base.clone(),
            checks: vec![default_status_check()],
        }]);
    }

    requests
        .into_iter()
        .enumerate()
        .map(|(index, request)| resolve_request(index, request, base_url))
        .collect()
}

fn resolve_request(
    index: usize,
    request: RequestConfig,
    base_url: Option<&Url>,
) -> AppResult<RequestSpec> {
    let method = request.method.unwrap_or(HttpMethod::Get);

    let mut url = match (request.url, request.path) {
        (Some(absolute), _) => parse_target_url(&absolute)?,
        (None, Some(path)) => {
            let Some(base) = base_url else {
                return Err(AppError::config(ConfigError::RequestMissingUrlOrPath {
                    index,
                }));
            };
            base.join(&path).map_err(|err| {
                AppError::http(HttpError::JoinUrlFailed {
                    url: path.clone(),
                    source: err,
                })
            })?
        }
        (None, None) => {
            let Some(base) = base_url else {
                return Err(AppError::config(ConfigError::RequestMissingUrlOrPath {
                    index,
                }));
            };
            base.clone()
        }
    };

    if url.host_str().is_none() {
        return Err(AppError::validation(ValidationError::UrlMissingHost));
    }

    if let Some(query) = request.query {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &query {
            pairs.append_pair(key, value);
        }
        drop(pairs);
    }

    let checks = request
        .checks
        .unwrap_or_default()
        .into_iter()
        .map(compile_check)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(RequestSpec {
        name: request.name,
        method,
        url,
        checks,
    })
}

fn parse_target_url(raw: &str) -> AppResult<Url> {
    let url = Url::parse(raw).map_err(|err| {
        AppError::validation(ValidationError::InvalidUrl {
            url: raw.to_owned(),
            source: err,
        })
    })?;
    if url.host_str().is_none() {
        return Err(AppError::validation(ValidationError::UrlMissingHost));
    }
    Ok(url)
}

fn default_status_check() -> CheckSpec {
    CheckSpec::new(
        DEFAULT_CHECK_NAME,
        CheckPredicate::StatusBetween { min: 200, max: 299 },
    )
}

fn compile_check(check: CheckConfig) -> AppResult<CheckSpec> {
    let CheckConfig {
        name,
        status_in,
        status_min,
        status_max,
        latency_under,
        succeeded,
    } = check;

    let predicate = match (status_in, status_min, status_max, latency_under, succeeded) {
        (Some(codes), None, None, None, None) => {
            if codes.is_empty() {
                return Err(AppError::config(ConfigError::CheckStatusListEmpty { name }));
            }
            CheckPredicate::StatusIn(codes)
        }
        (None, min, max, None, None) if min.is_some() || max.is_some() => {
            let min = min.unwrap_or(100);
            let max = max.unwrap_or(599);
            if min > max {
                return Err(AppError::config(ConfigError::CheckStatusRangeInverted {
                    name,
                }));
            }
            CheckPredicate::StatusBetween { min, max }
        }
        (None, None, None, Some(limit), None) => {
            let limit = limit.to_duration().map_err(|err| {
                AppError::config(ConfigError::InvalidDuration {
                    field: "latency_under",
                    source: err,
                })
            })?;
            CheckPredicate::LatencyUnder(limit)
        }
        (None, None, None, None, Some(true)) => CheckPredicate::Succeeded,
        (None, None, None, None, Some(false)) => {
            CheckPredicate::Custom(Arc::new(|outcome: &RequestOutcome| outcome.error.is_failure()))
        }
        (None, None, None, None, None) => {
            return Err(AppError::config(ConfigError::CheckPredicateMissing { name }));
        }
        _ => {
            return Err(AppError::config(ConfigError::CheckPredicateConflict {
                name,
            }));
        }
    };

    Ok(CheckSpec::new(&name, predicate))
}

fn reject_duplicate_check_names(requests: &[RequestSpec]) -> AppResult<()> {
    let mut seen: BTreeSet<Arc<str>> = BTreeSet::new();
    for request in requests {
        for check in &request.checks {
            if !seen.insert(Arc::clone(&check.name)) {
                return Err(AppError::config(ConfigError::DuplicateCheckName {
                    name: String::from(check.name.as_ref()),
                }));
            }
        }
    }
    Ok(())
}
