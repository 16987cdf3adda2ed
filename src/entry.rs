use clap::Parser;

use crate::args::EngineArgs;
use crate::config;
use crate::engine;
use crate::error::{AppError, AppResult, ValidationError};
use crate::logger;
use crate::report;

/// Binary entry point: parse flags, load the workload file, run the
/// engine, and emit the final report.
///
/// # Errors
///
/// Returns an error for invalid configuration or an engine failure.
pub fn run() -> AppResult<()> {
    let args = EngineArgs::parse();
    logger::init_logging(args.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::validation(ValidationError::RuntimeBuildFailed { source: err }))?;

    runtime.block_on(run_async(args))
}

async fn run_async(args: EngineArgs) -> AppResult<()> {
    let file = config::load_config(args.config.as_deref())?;
    let run_config = config::build_run_config(&args, file)?;

    let final_report = engine::run(run_config).await?;

    report::print_summary(&final_report);
    if let Some(path) = args.export_json.as_deref() {
        report::write_json(&final_report, path)?;
    }
    Ok(())
}
