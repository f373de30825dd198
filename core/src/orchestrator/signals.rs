//! Optional OS-signal adapter: SIGINT/SIGTERM request a graceful,
//! draining shutdown. Embedding callers that manage their own lifecycle
//! can simply not install it.

use crate::orchestrator::Orchestrator;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Spawns a listener that waits for SIGINT (Ctrl+C) or, on unix,
/// SIGTERM, and then calls `shutdown(wait = true)` on the orchestrator.
/// Once shutdown completes a blocking [`Orchestrator::start_blocking`]
/// loop returns, letting the process exit on its own.
///
/// [`Orchestrator::start_blocking`]: crate::orchestrator::Orchestrator::start_blocking
pub fn install(orchestrator: &Orchestrator) -> JoinHandle<()> {
    let orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("termination signal received, initiating graceful shutdown");
        orchestrator.shutdown(true).await;
    })
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
