//! Logger module
//!
//! Provides logging utilities for the HTTP server including:
//! - Startup and shutdown messages
//! - Access logging with multiple formats
//! - Error and warning logging
//! - File-based logging support

mod format;
pub mod writer;

pub use format::AccessLogEntry;

use crate::config::{AppState, Config};
use std::net::SocketAddr;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    writer::init(
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
    )
}

/// Write to info/access log
fn write_info(message: &str) {
    match writer::get() {
        Some(w) => w.write_info(message),
        None => println!("{message}"),
    }
}

/// Write to error log
fn write_error(message: &str) {
    match writer::get() {
        Some(w) => w.write_error(message),
        None => eprintln!("{message}"),
    }
}

/// Write to access log specifically
fn write_access(message: &str) {
    match writer::get() {
        Some(w) => w.write_access(message),
        None => println!("{message}"),
    }
}

pub fn log_server_start(addr: &SocketAddr, state: &AppState) {
    write_info(&format!(
        "Listening on port {}. Press Ctrl+C to stop.",
        addr.port()
    ));
    write_info(&format!("Serving {}", state.root.display()));
    if let Some(workers) = state.config.server.workers {
        write_info(&format!("Worker threads: {workers}"));
    }
    if let Some(ref path) = state.config.logging.access_log_file {
        write_info(&format!("Access log: {path}"));
    }
    if let Some(ref path) = state.config.logging.error_log_file {
        write_info(&format!("Error log: {path}"));
    }
}

pub fn log_shutdown(signal: &str) {
    write_info(&format!("\n[SIGNAL] {signal} received, shutting down"));
}

pub fn log_listener_closed(addr: &SocketAddr) {
    write_info(&format!("Stopped accepting connections on {addr}"));
}

pub fn log_connection_error(err: &impl std::fmt::Display) {
    write_error(&format!("[ERROR] Failed to serve connection: {err}"));
}

pub fn log_error(message: &str) {
    write_error(&format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    write_error(&format!("[WARN] {message}"));
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    write_access(&entry.format(format));
}
