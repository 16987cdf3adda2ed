mod cli;
mod defaults;
mod parsers;
mod types;

#[cfg(test)]
mod tests;

pub use cli::EngineArgs;
pub use types::{HttpMethod, PositiveU64, PositiveUsize};

pub(crate) use defaults::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_GRACE_PERIOD, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT,
};
