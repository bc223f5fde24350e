//! Two-stage interrupt handling.
//!
//! The first ctrl-c asks the driver to stop submitting work and drain what is
//! in flight. A second one aborts the process.

use tokio::sync::watch;

/// Exit status used when a second interrupt aborts the run.
pub const ABORT_EXIT_CODE: i32 = 130;

/// Install the handler and return the receiver the driver watches.
pub fn install_interrupt_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install CTRL+C signal handler");
            // Keep the sender alive so the driver never sees a closed channel
            std::future::pending::<()>().await;
        }
        tracing::warn!("Program will terminate after completion of current cluster CRUD");
        let _ = tx.send(true);

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Exiting due to multiple SIGINT");
            std::process::exit(ABORT_EXIT_CODE);
        }
        std::future::pending::<()>().await;
    });

    rx
}
