//! MIME type detection module
//!
//! Maps file extensions (with their leading dot, e.g. `.wasm`) to the
//! Content-Type sent for them. The table is built once at startup and shared
//! read-only by every connection.

use std::collections::HashMap;
use std::path::Path;

/// Returned when an extension has no entry
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

pub const WASM_EXTENSION: &str = ".wasm";
pub const WASM_MIME_TYPE: &str = "application/wasm";

/// Platform defaults. `.wasm` is deliberately absent; it is added on top.
const DEFAULT_TYPES: &[(&str, &str)] = &[
    // Text
    (".html", "text/html; charset=utf-8"),
    (".htm", "text/html; charset=utf-8"),
    (".css", "text/css"),
    (".txt", "text/plain; charset=utf-8"),
    (".md", "text/plain; charset=utf-8"),
    (".csv", "text/csv"),
    (".xml", "application/xml"),
    // JavaScript/JSON
    (".js", "application/javascript"),
    (".mjs", "application/javascript"),
    (".json", "application/json"),
    (".map", "application/json"),
    // Images
    (".png", "image/png"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".gif", "image/gif"),
    (".svg", "image/svg+xml"),
    (".ico", "image/x-icon"),
    (".webp", "image/webp"),
    // Video
    (".mp4", "video/mp4"),
    (".webm", "video/webm"),
    (".ogv", "video/ogg"),
    // Audio
    (".mp3", "audio/mpeg"),
    (".wav", "audio/wav"),
    (".ogg", "audio/ogg"),
    (".flac", "audio/flac"),
    // Fonts
    (".woff", "font/woff"),
    (".woff2", "font/woff2"),
    (".ttf", "font/ttf"),
    (".otf", "font/otf"),
    // Documents and archives
    (".pdf", "application/pdf"),
    (".zip", "application/zip"),
    (".gz", "application/gzip"),
    (".tar", "application/x-tar"),
];

/// Extension to MIME type table
///
/// # Examples
/// ```
/// use wasm_server::http::mime::ExtensionMap;
///
/// let map = ExtensionMap::for_server(&Default::default());
/// assert_eq!(map.lookup(".wasm"), "application/wasm");
/// assert_eq!(map.lookup(".HTML"), "text/html; charset=utf-8");
/// assert_eq!(map.lookup(".unknown"), "application/octet-stream");
/// ```
#[derive(Debug, Clone)]
pub struct ExtensionMap {
    types: HashMap<String, String>,
}

impl ExtensionMap {
    /// Table seeded with the platform defaults only
    pub fn platform_defaults() -> Self {
        Self {
            types: DEFAULT_TYPES
                .iter()
                .map(|(ext, mime)| ((*ext).to_string(), (*mime).to_string()))
                .collect(),
        }
    }

    /// Table used by the server: defaults, then `extra`, then `.wasm`
    pub fn for_server(extra: &HashMap<String, String>) -> Self {
        let mut map = Self::platform_defaults();
        for (ext, mime) in extra {
            map.insert(ext, mime);
        }
        map.insert(WASM_EXTENSION, WASM_MIME_TYPE);
        map
    }

    /// Add or replace an entry. A missing leading dot is added.
    pub fn insert(&mut self, extension: &str, mime_type: &str) {
        let key = if extension.starts_with('.') {
            extension.to_string()
        } else {
            format!(".{extension}")
        };
        self.types.insert(key, mime_type.to_string());
    }

    /// Look up an extension, exact case first, then lowercased
    pub fn lookup(&self, extension: &str) -> &str {
        if let Some(mime) = self.types.get(extension) {
            return mime;
        }
        self.types
            .get(&extension.to_lowercase())
            .map_or(DEFAULT_MIME_TYPE, String::as_str)
    }

    /// Content type for a file path, based on its final extension
    pub fn content_type_for(&self, path: &Path) -> &str {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.lookup(&format!(".{ext}")),
            None => DEFAULT_MIME_TYPE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_types() {
        let map = ExtensionMap::platform_defaults();
        assert_eq!(map.lookup(".html"), "text/html; charset=utf-8");
        assert_eq!(map.lookup(".css"), "text/css");
        assert_eq!(map.lookup(".js"), "application/javascript");
        assert_eq!(map.lookup(".json"), "application/json");
        assert_eq!(map.lookup(".png"), "image/png");
        assert_eq!(map.lookup(".mp4"), "video/mp4");
    }

    #[test]
    fn test_wasm_added_for_server() {
        let defaults = ExtensionMap::platform_defaults();
        assert_eq!(defaults.lookup(".wasm"), DEFAULT_MIME_TYPE);

        let map = ExtensionMap::for_server(&HashMap::new());
        assert_eq!(map.lookup(".wasm"), "application/wasm");
        assert_eq!(map.types.len(), defaults.types.len() + 1);
    }

    #[test]
    fn test_extra_entries_cannot_override_wasm() {
        let mut extra = HashMap::new();
        extra.insert("wasm".to_string(), "text/plain".to_string());
        extra.insert(".webmanifest".to_string(), "application/manifest+json".to_string());

        let map = ExtensionMap::for_server(&extra);
        assert_eq!(map.lookup(".wasm"), "application/wasm");
        assert_eq!(map.lookup(".webmanifest"), "application/manifest+json");
    }

    #[test]
    fn test_case_fallback() {
        let mut map = ExtensionMap::platform_defaults();
        map.insert(".Foo", "application/x-exact");
        assert_eq!(map.lookup(".Foo"), "application/x-exact");
        assert_eq!(map.lookup(".PNG"), "image/png");
    }

    #[test]
    fn test_unknown_extension() {
        let map = ExtensionMap::for_server(&HashMap::new());
        assert_eq!(map.lookup(".xyz"), DEFAULT_MIME_TYPE);
        assert_eq!(map.content_type_for(Path::new("Makefile")), DEFAULT_MIME_TYPE);
        assert_eq!(map.content_type_for(Path::new(".bashrc")), DEFAULT_MIME_TYPE);
    }

    #[test]
    fn test_content_type_for_path() {
        let map = ExtensionMap::for_server(&HashMap::new());
        assert_eq!(
            map.content_type_for(Path::new("pkg/app_bg.wasm")),
            "application/wasm"
        );
        assert_eq!(
            map.content_type_for(Path::new("archive.tar.gz")),
            "application/gzip"
        );
    }
}
