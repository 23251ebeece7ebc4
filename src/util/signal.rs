//! Process signal handling

use tracing::info;

/// Resolves once the process is asked to stop: ctrl-c everywhere, plus
/// SIGTERM on unix so container runtimes get a clean drain.
pub async fn shutdown_requested() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                info!(error = %e, "SIGTERM handler unavailable, watching ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
                info!("received ctrl-c, starting graceful shutdown");
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c, starting graceful shutdown");
            }
            _ = term.recv() => {
                info!("received SIGTERM, starting graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c, starting graceful shutdown");
    }
}
