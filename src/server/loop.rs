// Server loop module
// Accepts connections until the shutdown signal flips, then releases the listener

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// Accept connections and hand each one to its own task.
///
/// Accept errors (e.g. the process ran out of file descriptors) are logged
/// and the loop keeps going. When `shutdown` becomes `true` or its sender is
/// dropped, the listener is closed and the function returns.
pub async fn run_accept_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    active_connections: Arc<AtomicUsize>,
    mut shutdown: watch::Receiver<bool>,
) {
    let local_addr = listener.local_addr().ok();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(
                            stream,
                            peer_addr,
                            &state,
                            &active_connections,
                            shutdown.clone(),
                        );
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    drop(listener);
    if let Some(addr) = local_addr {
        logger::log_listener_closed(&addr);
    }
}
