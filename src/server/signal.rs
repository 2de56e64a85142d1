// Signal handling module
//
// Supported signals:
// - SIGINT:  Graceful shutdown (Ctrl+C)
// - SIGTERM: Graceful shutdown

use crate::error::ServerError;

/// Wait until the process is asked to stop (Unix)
///
/// # Returns
///
/// Name of the signal that arrived
#[cfg(unix)]
pub async fn wait_for_shutdown() -> Result<&'static str, ServerError> {
    use tokio::signal::unix::{signal, SignalKind};

    let register = |kind: SignalKind| {
        signal(kind).map_err(|source| ServerError::Io {
            context: "failed to register signal handler",
            source,
        })
    };
    let mut sigint = register(SignalKind::interrupt())?;
    let mut sigterm = register(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

/// Windows fallback - only handles Ctrl+C
#[cfg(not(unix))]
pub async fn wait_for_shutdown() -> Result<&'static str, ServerError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|source| ServerError::Io {
            context: "failed to listen for Ctrl+C",
            source,
        })?;
    Ok("Ctrl+C")
}
