//! Server error types
//!
//! Startup errors (`Bind`, `Config`, `Log`, `Io`) are fatal. Request errors
//! (`RequestParse`, `NotFound`, `Forbidden`, `FileAccess`) are turned into an
//! HTTP error response and never leave the request handler. `Connection`
//! errors end a single connection.

use hyper::StatusCode;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ServerError {
    /// Listening socket could not be created or bound
    Bind { addr: SocketAddr, source: io::Error },
    /// Configuration file could not be read or deserialized
    Config(config::ConfigError),
    /// Log files could not be opened
    Log(io::Error),
    /// Other startup I/O failure (runtime, working directory, signal handlers)
    Io { context: &'static str, source: io::Error },
    /// Request target could not be decoded
    RequestParse(String),
    /// Requested path does not exist
    NotFound(PathBuf),
    /// Requested path escapes the root or may not be read
    Forbidden(String),
    /// Any other failure while reading from disk
    FileAccess { path: PathBuf, source: io::Error },
    /// Client connection failed mid-exchange
    Connection(hyper::Error),
}

impl ServerError {
    /// Classify an I/O error raised while accessing `path`
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::Forbidden(format!(
                "permission denied: {}",
                path.display()
            )),
            _ => Self::FileAccess {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// HTTP status a request-level error is reported with
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::RequestParse(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short message shown to the client in the error page
    pub const fn client_message(&self) -> &'static str {
        match self {
            Self::RequestParse(_) => "Bad request syntax",
            Self::NotFound(_) => "File not found",
            Self::Forbidden(_) => "Access denied",
            _ => "Internal server error",
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind { addr, source } => write!(f, "failed to bind {addr}: {source}"),
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
            Self::Log(e) => write!(f, "failed to open log file: {e}"),
            Self::Io { context, source } => write!(f, "{context}: {source}"),
            Self::RequestParse(msg) => write!(f, "malformed request: {msg}"),
            Self::NotFound(path) => write!(f, "not found: {}", path.display()),
            Self::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            Self::FileAccess { path, source } => {
                write!(f, "failed to read '{}': {source}", path.display())
            }
            Self::Connection(e) => write!(f, "connection error: {e}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. }
            | Self::Io { source, .. }
            | Self::FileAccess { source, .. } => Some(source),
            Self::Log(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Connection(e) => Some(e),
            Self::RequestParse(_) | Self::NotFound(_) | Self::Forbidden(_) => None,
        }
    }
}

impl From<config::ConfigError> for ServerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err)
    }
}
