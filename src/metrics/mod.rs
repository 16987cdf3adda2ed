mod collector;
mod histogram;
mod types;


pub use collector::{sample_channel, setup_metrics_collector};
pub use histogram::LatencyHistogram;
pub use types::{AggregateMetrics, CheckTally, LatencySummary, RunProgress, Sample};
