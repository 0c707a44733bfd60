//! OS signal handling.

use crate::lifecycle::Shutdown;

/// Resolve on Ctrl+C, or SIGTERM on unix.
pub async fn wait_for_termination() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Trigger `shutdown` when the process is asked to terminate.
pub fn spawn_signal_listener(shutdown: &Shutdown) {
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_termination().await;
        tracing::info!("Shutdown signal received");
        trigger.trigger();
    });
}
