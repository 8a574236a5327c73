mod args;
mod generation;
mod logging;
mod oracle;
mod runner;
mod shrinker;

use std::process::ExitCode;

use clap::Parser;

use crate::args::{Args, SimConfig};

fn main() -> ExitCode {
    let args = Args::parse();
    let config = SimConfig::from_args(args);
    if let Err(err) = logging::init(config.log.as_deref(), config.verbose) {
        eprintln!("failed to open log file: {err}");
        return ExitCode::FAILURE;
    }
    if config.verbose {
        dbmux::logging::set_statement_logging(true);
    }

    let config_json = serde_json::to_string_pretty(&config).unwrap_or_else(|_| "{}".to_string());
    tracing::info!("config: {}", config_json);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "failed to start tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(runner::run(&config)) {
        Ok(Ok(summary)) => {
            tracing::info!(
                rounds = summary.rounds,
                matched_rows = summary.matched_rows,
                seed = config.seed,
                "all rounds agree with the reference evaluator"
            );
            ExitCode::SUCCESS
        }
        Ok(Err(failure)) => {
            tracing::error!(
                round = failure.round,
                seed = config.seed,
                message = %failure.message,
                "backend disagrees with the reference evaluator"
            );
            if let Some(shrunk) = failure.shrunk {
                tracing::error!(
                    nodes_before = shrunk.report.original_nodes,
                    nodes_after = shrunk.report.shrunk_nodes,
                    attempts = shrunk.report.attempts,
                    condition = ?shrunk.condition,
                    "minimal failing condition"
                );
            }
            ExitCode::FAILURE
        }
        Err(err) => {
            tracing::error!(error = %err, kind = ?err.kind(), "simulation aborted");
            ExitCode::FAILURE
        }
    }
}
