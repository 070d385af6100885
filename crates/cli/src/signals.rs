//! Ctrl+C handling for long-running batches.
//!
//! The first Ctrl+C sets the batch cancellation flag so the orchestrator
//! stops before its next file; work already done is kept.

use mergemend_core::CancellationFlag;
use tracing::{info, warn};

/// Spawn a task that cancels `flag` when Ctrl+C is received.
pub fn cancel_on_ctrl_c(flag: CancellationFlag) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received SIGINT (Ctrl+C), cancelling batch");
                flag.cancel();
            }
            Err(e) => warn!(error = %e, "failed to install Ctrl+C handler"),
        }
    });
}
