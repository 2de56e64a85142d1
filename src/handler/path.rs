//! Request path translation
//!
//! Turns the path of a request target into a filesystem path under the
//! served root. `..` segments may never climb above the root, and the
//! canonical result must stay inside the canonical root, so symlinks
//! pointing elsewhere are refused too.

use crate::error::ServerError;
use std::io;
use std::path::{Path, PathBuf};

/// Request path mapped onto the filesystem, not yet checked for existence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedPath {
    /// `root` joined with the normalized request segments
    pub fs_path: PathBuf,
    /// Decoded request path, always starting with `/`
    pub display_path: String,
    /// Normalized path, percent-encoded again, with exactly one leading `/`
    pub url_path: String,
    /// Whether the request path ended with `/`
    pub trailing_slash: bool,
}

/// Decode and normalize a request path against `root`
///
/// Empty and `.` segments are dropped; `..` removes the previous segment.
///
/// # Errors
/// * `RequestParse` - not an origin-form path, bad percent-encoding or NUL byte
/// * `Forbidden` - a `..` segment would leave the root
pub fn translate(root: &Path, request_path: &str) -> Result<TranslatedPath, ServerError> {
    if !request_path.starts_with('/') {
        return Err(ServerError::RequestParse(format!(
            "request target must start with '/': {request_path}"
        )));
    }

    let decoded = urlencoding::decode(request_path)
        .map_err(|e| ServerError::RequestParse(format!("invalid percent-encoding: {e}")))?;
    if decoded.contains('\0') {
        return Err(ServerError::RequestParse("NUL byte in path".to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(ServerError::Forbidden(format!(
                        "path escapes the served directory: {request_path}"
                    )));
                }
            }
            // A backslash would act as a separator on Windows
            s if cfg!(windows) && s.contains('\\') => {
                return Err(ServerError::Forbidden(format!(
                    "path separator in segment: {request_path}"
                )));
            }
            s => segments.push(s),
        }
    }

    let fs_path = segments
        .iter()
        .fold(root.to_path_buf(), |path, segment| path.join(segment));
    let mut url_path: String = segments
        .iter()
        .map(|segment| format!("/{}", urlencoding::encode(segment)))
        .collect();
    if url_path.is_empty() {
        url_path.push('/');
    }

    Ok(TranslatedPath {
        fs_path,
        trailing_slash: decoded.ends_with('/'),
        url_path,
        display_path: decoded.into_owned(),
    })
}

/// Resolve symlinks and make sure the result is still inside `root`
///
/// `root` must already be canonical.
pub fn confine(root: &Path, path: &Path) -> Result<PathBuf, ServerError> {
    let canonical = match path.canonicalize() {
        Ok(p) => p,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(ServerError::from_io(path, e));
        }
        // File not found is common (404); so is a file used as a directory
        Err(_) => return Err(ServerError::NotFound(path.to_path_buf())),
    };

    if !canonical.starts_with(root) {
        return Err(ServerError::Forbidden(format!(
            "{} resolves outside the served directory",
            path.display()
        )));
    }
    Ok(canonical)
}
