use std::time::Duration;

pub(crate) const DEFAULT_USER_AGENT: &str =
    concat!("stampede-loadtest/", env!("CARGO_PKG_VERSION"));

/// Hard per-request timeout applied when neither CLI nor config set one.
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra time in-flight work gets after the stop signal before VUs are
/// abandoned.
pub(crate) const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
