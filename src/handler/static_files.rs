//! Static file serving module
//!
//! Default handler behind the router: files, index files and directory
//! listings under the served root.

use crate::config::AppState;
use crate::error::ServerError;
use crate::handler::path::{self, TranslatedPath};
use crate::handler::router::RequestContext;
use crate::http::{self, conditional};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use std::path::{Path, PathBuf};
use tokio::fs;

/// One row of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// Serve whatever the request path maps to
pub async fn serve(
    ctx: &RequestContext<'_>,
    state: &AppState,
) -> Result<Response<Full<Bytes>>, ServerError> {
    let translated = path::translate(&state.root, ctx.path)?;
    let resolved = path::confine(&state.root, &translated.fs_path)?;
    let metadata = fs::metadata(&resolved)
        .await
        .map_err(|e| ServerError::from_io(&resolved, e))?;

    if metadata.is_dir() {
        return serve_directory(ctx, state, &translated, &resolved).await;
    }

    // "/file.txt/" names a directory that does not exist
    if translated.trailing_slash {
        return Err(ServerError::NotFound(resolved));
    }

    // The requested name decides the type, whatever a symlink points at
    serve_file(ctx, state, &resolved, &translated.fs_path).await
}

async fn serve_directory(
    ctx: &RequestContext<'_>,
    state: &AppState,
    translated: &TranslatedPath,
    dir: &Path,
) -> Result<Response<Full<Bytes>>, ServerError> {
    // Relative links in the page only resolve against a slash-terminated URL
    if !translated.trailing_slash {
        return Ok(http::build_redirect_response(&directory_location(
            translated, ctx.query,
        )));
    }

    if let Some((index, name)) =
        find_index_file(&state.root, dir, &state.config.http.index_files).await
    {
        return serve_file(ctx, state, &index, Path::new(name)).await;
    }

    if !state.config.http.directory_listing {
        return Err(ServerError::Forbidden(format!(
            "directory listing disabled: {}",
            dir.display()
        )));
    }

    let entries = read_listing(dir).await?;
    let page = render_listing(&translated.display_path, &entries);
    Ok(http::build_html_response(page, ctx.is_head))
}

/// Redirect target for a directory requested without its trailing slash
///
/// Built from the normalized path so that `//host` style requests can only
/// ever redirect within this server.
fn directory_location(translated: &TranslatedPath, query: Option<&str>) -> String {
    let mut location = translated.url_path.clone();
    if !location.ends_with('/') {
        location.push('/');
    }
    if let Some(q) = query {
        location.push('?');
        location.push_str(q);
    }
    location
}

async fn serve_file(
    ctx: &RequestContext<'_>,
    state: &AppState,
    file_path: &Path,
    type_path: &Path,
) -> Result<Response<Full<Bytes>>, ServerError> {
    let metadata = fs::metadata(file_path)
        .await
        .map_err(|e| ServerError::from_io(file_path, e))?;
    let modified = metadata
        .modified()
        .map_err(|e| ServerError::from_io(file_path, e))?;

    if conditional::is_not_modified(ctx.if_modified_since.as_deref(), ctx.has_if_none_match, modified) {
        return Ok(http::build_304_response(modified));
    }

    let content = fs::read(file_path)
        .await
        .map_err(|e| ServerError::from_io(file_path, e))?;
    let content_type = state.mime.content_type_for(type_path);

    Ok(http::build_file_response(
        Bytes::from(content),
        content_type,
        modified,
        ctx.is_head,
    ))
}

/// First configured index file that exists inside `dir`, with its name
async fn find_index_file<'a>(
    root: &Path,
    dir: &Path,
    index_files: &'a [String],
) -> Option<(PathBuf, &'a str)> {
    for index_file in index_files {
        let Ok(candidate) = path::confine(root, &dir.join(index_file)) else {
            continue;
        };
        if fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
            return Some((candidate, index_file.as_str()));
        }
    }
    None
}

/// Read directory entries, sorted case-insensitively by name
pub async fn read_listing(dir: &Path) -> Result<Vec<ListingEntry>, ServerError> {
    // Unlistable directories are reported as missing
    let mut reader = fs::read_dir(dir)
        .await
        .map_err(|_| ServerError::NotFound(dir.to_path_buf()))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| ServerError::from_io(dir, e))?
    {
        let is_symlink = entry.file_type().await.is_ok_and(|t| t.is_symlink());
        // follows symlinks, so a link to a directory lists as one
        let is_dir = fs::metadata(entry.path()).await.is_ok_and(|m| m.is_dir());
        entries.push(ListingEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir,
            is_symlink,
        });
    }

    entries.sort_by_key(|e| e.name.to_lowercase());
    Ok(entries)
}

/// Render the HTML page for a directory listing
pub fn render_listing(display_path: &str, entries: &[ListingEntry]) -> String {
    let title = format!("Directory listing for {}", escape_html(display_path));
    let mut page = format!(
        "<!DOCTYPE HTML>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>{title}</title>\n\
         </head>\n\
         <body>\n\
         <h1>{title}</h1>\n\
         <hr>\n\
         <ul>\n"
    );

    for entry in entries {
        let mut display_name = entry.name.clone();
        let mut link_name = entry.name.clone();
        if entry.is_dir {
            display_name.push('/');
            link_name.push('/');
        }
        if entry.is_symlink {
            // Links keep the directory slash in the href only
            display_name = format!("{}@", entry.name);
        }
        page.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            urlencoding::encode(&link_name).replace("%2F", "/"),
            escape_html(&display_name)
        ));
    }

    page.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    page
}

/// Escape special characters for HTML text and attribute values
fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, is_dir: bool, is_symlink: bool) -> ListingEntry {
        ListingEntry {
            name: name.to_string(),
            is_dir,
            is_symlink,
        }
    }

    #[test]
    fn test_render_listing() {
        let page = render_listing(
            "/pkg/",
            &[
                entry("app.wasm", false, false),
                entry("assets", true, false),
                entry("current", true, true),
            ],
        );
        assert!(page.contains("<title>Directory listing for /pkg/</title>"));
        assert!(page.contains(r#"<li><a href="app.wasm">app.wasm</a></li>"#));
        assert!(page.contains(r#"<li><a href="assets/">assets/</a></li>"#));
        assert!(page.contains(r#"<li><a href="current/">current@</a></li>"#));
    }

    #[test]
    fn test_listing_escapes_names() {
        let page = render_listing("/<x>/", &[entry("a b&c.txt", false, false)]);
        assert!(page.contains("Directory listing for /&lt;x&gt;/"));
        assert!(page.contains(r#"href="a%20b%26c.txt""#));
        assert!(page.contains(">a b&amp;c.txt<"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;");
    }

    #[tokio::test]
    async fn test_read_listing_sorted() {
        let dir = std::env::temp_dir().join(format!("wasm-server-listing-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("Beta")).unwrap();
        std::fs::write(dir.join("alpha.txt"), b"a").unwrap();
        std::fs::write(dir.join("gamma.wasm"), b"g").unwrap();

        let entries = read_listing(&dir).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha.txt", "Beta", "gamma.wasm"]);
        assert!(entries[1].is_dir);
        assert!(!entries[0].is_dir);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_directory_location_stays_on_server() {
        let t = path::translate(Path::new("/srv"), "//evil.example").unwrap();
        assert_eq!(directory_location(&t, None), "/evil.example/");

        let t = path::translate(Path::new("/srv"), "/pkg").unwrap();
        assert_eq!(directory_location(&t, Some("v=2")), "/pkg/?v=2");

        let t = path::translate(Path::new("/srv"), "/.").unwrap();
        assert_eq!(directory_location(&t, None), "/");
    }

    #[tokio::test]
    async fn test_read_listing_missing_dir() {
        let err = read_listing(Path::new("/no/such/listing/dir")).await.unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }
}
