// Configuration types module
// Defines the tunables that can be read from wasm-server.toml

use serde::Deserialize;
use std::collections::HashMap;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    /// Extra extension to MIME type entries, e.g. `webmanifest = "application/manifest+json"`
    #[serde(default)]
    pub mime_types: HashMap<String, String>,
}

/// Server configuration
///
/// The listen address is fixed and lives in [`super::LISTEN_PORT`], not here.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServerConfig {
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub access_log: bool,
    /// Access log format (common, combined, json, or custom pattern)
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive: bool,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
    /// Seconds to wait for open connections after the listener closes
    pub shutdown_grace: u64,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub index_files: Vec<String>,
    pub directory_listing: bool,
}
