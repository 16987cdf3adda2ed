use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::args::HttpMethod;
use crate::error::ValidationError;

#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub vus: Option<usize>,
    pub duration: Option<DurationValue>,
    pub iterations: Option<u64>,
    pub base_url: Option<String>,
    pub timeout: Option<DurationValue>,
    pub connect_timeout: Option<DurationValue>,
    pub think_time: Option<DurationValue>,
    pub grace_period: Option<DurationValue>,
    pub requests: Option<Vec<RequestConfig>>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct RequestConfig {
    pub name: Option<String>,
    pub method: Option<HttpMethod>,
    pub url: Option<String>,
    pub path: Option<String>,
    pub query: Option<BTreeMap<String, String>>,
    pub checks: Option<Vec<CheckConfig>>,
}

/// One declarative check. Exactly one predicate field must be set; the
/// `status_min`/`status_max` pair counts as a single range predicate.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct CheckConfig {
    pub name: String,
    pub status_in: Option<Vec<u16>>,
    pub status_min: Option<u16>,
    pub status_max: Option<u16>,
    pub latency_under: Option<DurationValue>,
    pub succeeded: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    pub(crate) fn to_duration(&self) -> Result<Duration, ValidationError> {
        match self {
            DurationValue::Seconds(secs) => {
                if *secs == 0 {
                    Err(ValidationError::DurationZero)
                } else {
                    Ok(Duration::from_secs(*secs))
                }
            }
            DurationValue::Text(text) => super::parse_duration_value(text),
        }
    }
}
