// Connection handling module
// Serves a single TCP connection with hyper's HTTP/1 implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::watch;

use super::guard::GuardedStream;
use crate::config::AppState;
use crate::error::ServerError;
use crate::handler;
use crate::logger;

/// Accept a connection, enforcing the optional connection limit.
///
/// # Arguments
///
/// * `stream` - The TCP stream to handle
/// * `peer_addr` - The peer's socket address
/// * `state` - Shared application state
/// * `conn_counter` - Active connection counter
/// * `shutdown` - Flips to `true` when the server is stopping
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    conn_counter: &Arc<AtomicUsize>,
    shutdown: watch::Receiver<bool>,
) {
    // Increment counter first, then check limit (prevents race condition)
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            // Exceeded limit: rollback counter and reject
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection from {peer_addr} rejected."
            ));
            drop(stream);
            return;
        }
    }

    handle_connection(
        stream,
        peer_addr,
        Arc::clone(state),
        Arc::clone(conn_counter),
        shutdown,
    );
}

/// Handle a single connection in a spawned task.
///
/// This function:
/// 1. Wraps the TCP stream in a [`GuardedStream`] and `TokioIo`
/// 2. Configures HTTP/1 keep-alive and the header read timeout
/// 3. Serves the connection with the request router
/// 4. Switches to graceful shutdown when the server stops
/// 5. Decrements the connection counter when done
///
/// There is no limit on how long a connection lives: idle and slow request
/// heads end at the header read timeout, a client that stops reading a
/// response ends at the write stall timeout.
fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
    conn_counter: Arc<AtomicUsize>,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let guarded = GuardedStream::new(
            stream,
            peer_addr,
            state.config.http.server_name.clone(),
            state.config.write_stall_timeout(),
        );
        let io = TokioIo::new(guarded);

        let mut builder = http1::Builder::new();
        builder
            .keep_alive(state.config.performance.keep_alive)
            // The next request head is read only once the previous response is out
            .half_close(true)
            .timer(TokioTimer::new())
            .header_read_timeout(state.config.header_read_timeout());

        let service_state = Arc::clone(&state);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                handler::handle_request(req, Arc::clone(&service_state), peer_addr)
            }),
        );
        tokio::pin!(conn);

        let mut draining = *shutdown.borrow();
        if draining {
            conn.as_mut().graceful_shutdown();
        }

        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(err) = result {
                        logger::log_connection_error(&ServerError::Connection(err));
                    }
                    break;
                }
                changed = shutdown.changed(), if !draining => {
                    // A dropped sender also means the server is gone
                    if changed.is_err() || *shutdown.borrow() {
                        draining = true;
                        conn.as_mut().graceful_shutdown();
                    }
                }
            }
        }

        // Decrement active connection counter
        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}
