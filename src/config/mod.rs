// Configuration module entry point
// Loads tunables and builds the immutable runtime state

mod state;
mod types;

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};

// Re-export public types
pub use state::AppState;
pub use types::{Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig};

/// Port the server listens on
pub const LISTEN_PORT: u16 = 8080;

/// Optional configuration file (without extension) looked up in the working directory
pub const CONFIG_FILE: &str = "wasm-server";

/// Address the server binds to: all IPv4 interfaces on [`LISTEN_PORT`]
pub fn listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, LISTEN_PORT))
}

impl Config {
    /// Load configuration from specified file path (without extension).
    /// A missing file is not an error; defaults apply.
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        defaults()?
            .add_source(config::File::with_name(config_path).required(false))
            .build()?
            .try_deserialize()
    }

    /// Configuration made only of the compiled-in defaults
    pub fn from_defaults() -> Result<Self, ConfigError> {
        defaults()?.build()?.try_deserialize()
    }

    /// How long a client may take to send a complete request head
    pub const fn header_read_timeout(&self) -> Duration {
        Duration::from_secs(self.performance.read_timeout)
    }

    /// How long a single write may stay blocked on a client that stopped
    /// reading. `0` disables the limit.
    pub const fn write_stall_timeout(&self) -> Option<Duration> {
        match self.performance.write_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    config::Config::builder()
        .set_default("logging.access_log", true)?
        .set_default("logging.access_log_format", "common")?
        .set_default("performance.keep_alive", true)?
        .set_default("performance.read_timeout", 30)?
        .set_default("performance.write_timeout", 30)?
        .set_default("performance.shutdown_grace", 5)?
        .set_default(
            "http.server_name",
            concat!("wasm-server/", env!("CARGO_PKG_VERSION")),
        )?
        .set_default("http.index_files", vec!["index.html", "index.htm"])?
        .set_default("http.directory_listing", true)
}
