//! Process signal handling.

use tokio::signal;
use tracing::{error, info};

/// Resolve on SIGTERM or SIGINT.
///
/// A handler that cannot be installed is logged and never fires, so the
/// other signal still triggers shutdown.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, initiating shutdown"),
        () = terminate => info!("received SIGTERM, initiating shutdown"),
    }
}
