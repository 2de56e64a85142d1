// Application state module
// Immutable state shared by every connection

use std::path::{Path, PathBuf};

use super::types::Config;
use crate::error::ServerError;
use crate::http::ExtensionMap;

/// Application state
///
/// Built once before the listener starts and never mutated afterwards, so
/// connections share it through an `Arc` without locking.
pub struct AppState {
    pub config: Config,
    /// Extension table including the `.wasm` entry
    pub mime: ExtensionMap,
    /// Canonical directory files are served from
    pub root: PathBuf,
}

impl AppState {
    pub fn new(config: Config, root: &Path) -> Result<Self, ServerError> {
        let root = root.canonicalize().map_err(|source| ServerError::Io {
            context: "failed to resolve served directory",
            source,
        })?;
        let mime = ExtensionMap::for_server(&config.mime_types);

        Ok(Self { config, mime, root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_builds_wasm_table() {
        let cfg = Config::from_defaults().unwrap();
        let state = AppState::new(cfg, Path::new(".")).unwrap();
        assert_eq!(state.mime.lookup(".wasm"), "application/wasm");
        assert!(state.root.is_absolute());
    }

    #[test]
    fn test_missing_root_is_error() {
        let cfg = Config::from_defaults().unwrap();
        let result = AppState::new(cfg, Path::new("/no/such/served/dir"));
        assert!(matches!(result, Err(ServerError::Io { .. })));
    }
}
