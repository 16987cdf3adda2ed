use clap::Parser;
use std::time::Duration;

use super::parsers::{parse_duration_arg, parse_positive_u64, parse_positive_usize};
use super::types::{HttpMethod, PositiveU64, PositiveUsize};

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Synthetic load-generation engine - concurrent virtual users, declarative checks, and exact latency/throughput metrics for HTTP endpoints."
)]
pub struct EngineArgs {
    /// Path to a workload config file (.toml or .json)
    #[arg(long, short = 'c')]
    pub config: Option<String>,

    /// Target URL shortcut for a single-request workload
    #[arg(long, short = 'u')]
    pub url: Option<String>,

    /// HTTP method for the --url shortcut
    #[arg(long, short = 'X', default_value = "get", ignore_case = true)]
    pub method: HttpMethod,

    /// Number of concurrent virtual users
    #[arg(long, env = "STAMPEDE_VUS", value_parser = parse_positive_usize)]
    pub vus: Option<PositiveUsize>,

    /// Test duration (supports ms/s/m/h); mutually exclusive with --iterations
    #[arg(
        long,
        short = 'd',
        env = "STAMPEDE_DURATION",
        value_parser = parse_duration_arg,
        conflicts_with = "iterations"
    )]
    pub duration: Option<Duration>,

    /// Iteration budget shared across all VUs; mutually exclusive with --duration
    #[arg(long, short = 'n', value_parser = parse_positive_u64)]
    pub iterations: Option<PositiveU64>,

    /// Base URL prepended to relative request paths
    #[arg(long = "base-url", env = "STAMPEDE_BASE_URL")]
    pub base_url: Option<String>,

    /// Per-request timeout (supports ms/s/m/h)
    #[arg(long, value_parser = parse_duration_arg)]
    pub timeout: Option<Duration>,

    /// Connect timeout (supports ms/s/m/h)
    #[arg(long = "connect-timeout", value_parser = parse_duration_arg)]
    pub connect_timeout: Option<Duration>,

    /// Pause between iterations (supports ms/s/m/h)
    #[arg(long = "think-time", value_parser = parse_duration_arg)]
    pub think_time: Option<Duration>,

    /// Extra time in-flight work gets after the stop signal before VUs are abandoned
    #[arg(long = "grace-period", value_parser = parse_duration_arg)]
    pub grace_period: Option<Duration>,

    /// Write the final report as JSON to this path
    #[arg(long = "export-json")]
    pub export_json: Option<String>,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,
}
