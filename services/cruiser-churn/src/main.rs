use std::process::ExitCode;

use clap::Parser;
use cruiser_churn::Cli;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug);

    match cruiser_churn::run(&cli).await {
        Ok(summary) => {
            tracing::info!(
                completions = summary.completions,
                created = summary.created,
                updated = summary.updated,
                deleted = summary.deleted,
                frozen = summary.frozen,
                "Churn summary"
            );
            tracing::debug!("Final counters:\n{}", armada_perf_core::metrics::export_metrics());
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Cluster churn failed");
            ExitCode::FAILURE
        }
    }
}

/// RUST_LOG wins over the verbosity flags.
fn init_logging(verbose: bool, debug: bool) {
    let default_level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt().with_env_filter(env_filter).with_target(false).init();
}
