//! Shutdown signal listener.

use crate::runtime::TaskRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Register a task that cancels `token` on SIGTERM or SIGINT
///
/// The listener also returns when the token is cancelled by anything else,
/// so it never outlives shutdown.
pub fn cancel_on_shutdown(registry: &TaskRegistry, token: CancellationToken) {
    registry.spawn("signal-listener", async move {
        tokio::select! {
            () = token.cancelled() => {}
            signal = shutdown_signal() => {
                match signal {
                    Ok(name) => info!(signal = name, "Received shutdown signal, cancelling all tasks"),
                    Err(e) => error!(error = %e, "Unable to listen for shutdown signals, cancelling all tasks"),
                }
                token.cancel();
            }
        }
    });
}

async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "SIGINT")
    }
}
