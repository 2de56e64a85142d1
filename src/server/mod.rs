// Server module entry point
// Listener creation, connection handling and the start/stop lifecycle

pub mod connection;
pub mod guard;
pub mod listener;
pub mod signal;

// `loop` is a keyword, so the module gets another name
#[path = "loop.rs"]
pub mod server_loop;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::AppState;
use crate::error::ServerError;
use crate::logger;

pub use listener::create_listener;
pub use server_loop::run_accept_loop;

/// Entry point for starting the static file server
pub struct Server;

impl Server {
    /// Bind `addr` and start accepting connections in the background.
    ///
    /// Must be called from within a Tokio runtime. The socket is bound before
    /// this returns, so a `RunningServer` is always ready for connections.
    pub fn start(addr: SocketAddr, state: Arc<AppState>) -> Result<RunningServer, ServerError> {
        let listener =
            create_listener(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));
        let grace = Duration::from_secs(state.config.performance.shutdown_grace);

        let accept_task = tokio::spawn(run_accept_loop(
            listener,
            state,
            Arc::clone(&active_connections),
            shutdown_rx,
        ));

        Ok(RunningServer {
            local_addr,
            shutdown_tx,
            accept_task,
            active_connections,
            grace,
        })
    }
}

/// Handle to a server started with [`Server::start`]
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    active_connections: Arc<AtomicUsize>,
    grace: Duration,
}

impl RunningServer {
    /// Address the listener is bound to
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    /// Stop accepting, release the listening socket, then give open
    /// connections up to the grace period to finish.
    pub async fn stop(self) {
        // Receivers may already be gone; nothing left to notify then
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = self.accept_task.await {
            logger::log_error(&format!("Accept loop ended abnormally: {e}"));
        }

        let deadline = tokio::time::Instant::now() + self.grace;
        while self.active_connections.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                logger::log_warning(&format!(
                    "{} connection(s) still open after {} seconds, closing anyway",
                    self.active_connections.load(Ordering::SeqCst),
                    self.grace.as_secs()
                ));
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
