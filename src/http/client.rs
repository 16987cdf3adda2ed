use reqwest::Client;

use crate::args::DEFAULT_USER_AGENT;
use crate::error::{AppError, AppResult, HttpError};
use crate::workload::RunConfig;

/// Builds the HTTP client shared by every VU of a run. The client-level
/// timeout is the engine's hard per-request bound.
///
/// # Errors
///
/// Returns an error if the client cannot be constructed.
pub fn build_client(config: &RunConfig) -> AppResult<Client> {
    Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(DEFAULT_USER_AGENT)
        .build()
        .map_err(|err| AppError::http(HttpError::BuildClientFailed { source: err }))
}
