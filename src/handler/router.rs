//! Request dispatch module
//!
//! Entry point for HTTP request processing: method validation, delegation to
//! the static file handler, then the post-processing every response goes
//! through (base headers, cross-origin isolation headers, access log).

use crate::config::AppState;
use crate::error::ServerError;
use crate::handler::static_files;
use crate::http::{self, isolation};
use crate::logger::{self, AccessLogEntry};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::{header, Method, Request, Response, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Request context encapsulating information needed for request processing
pub struct RequestContext<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub version: Version,
    pub is_head: bool,
    pub if_modified_since: Option<String>,
    pub has_if_none_match: bool,
}

impl<'a> RequestContext<'a> {
    pub fn from_request<B>(req: &'a Request<B>) -> Self {
        let method = req.method();
        Self {
            method,
            path: req.uri().path(),
            query: req.uri().query(),
            version: req.version(),
            is_head: *method == Method::HEAD,
            if_modified_since: header_string(req, header::IF_MODIFIED_SINCE),
            has_if_none_match: req.headers().contains_key(header::IF_NONE_MATCH),
        }
    }
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let ctx = RequestContext::from_request(&req);

    let mut response = respond(&ctx, &state).await;

    let connection = connection_token(&req, state.config.performance.keep_alive);
    http::apply_base_headers(&mut response, &state.config.http.server_name, connection);
    isolation::apply(&mut response);

    if state.config.logging.access_log {
        let entry = access_entry(&req, &ctx, &response, peer_addr, started);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Produce the base response, before any header post-processing
async fn respond(ctx: &RequestContext<'_>, state: &AppState) -> Response<Full<Bytes>> {
    if let Some(resp) = check_http_method(ctx.method) {
        return resp;
    }

    match static_files::serve(ctx, state).await {
        Ok(resp) => resp,
        Err(err) => error_response(&err, ctx),
    }
}

/// Only GET and HEAD are served
fn check_http_method(method: &Method) -> Option<Response<Full<Bytes>>> {
    match *method {
        Method::GET | Method::HEAD => None,
        _ => {
            logger::log_warning(&format!("Unsupported method: {method}"));
            Some(http::build_501_response())
        }
    }
}

/// `Connection` value the response has to announce, if any
///
/// HTTP/1.1 stays persistent unless either side says otherwise; HTTP/1.0
/// only when the client asked for keep-alive.
fn connection_token<B>(req: &Request<B>, keep_alive: bool) -> Option<&'static str> {
    let requested = |token: &str| {
        req.headers()
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    };

    if !keep_alive || requested("close") {
        return Some("close");
    }
    match req.version() {
        Version::HTTP_10 if requested("keep-alive") => Some("keep-alive"),
        Version::HTTP_10 => Some("close"),
        _ => None,
    }
}

/// Convert a request error into its HTTP error page
fn error_response(err: &ServerError, ctx: &RequestContext<'_>) -> Response<Full<Bytes>> {
    match err {
        // 404 and 400 are routine, the access log records them
        ServerError::NotFound(_) | ServerError::RequestParse(_) => {}
        ServerError::Forbidden(_) => {
            logger::log_warning(&format!("{} {}: {err}", ctx.method, ctx.path));
        }
        _ => logger::log_error(&format!("{} {}: {err}", ctx.method, ctx.path)),
    }
    http::build_error_response(err.status(), err.client_message(), ctx.is_head)
}

fn access_entry<B>(
    req: &Request<B>,
    ctx: &RequestContext<'_>,
    response: &Response<Full<Bytes>>,
    peer_addr: SocketAddr,
    started: Instant,
) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        ctx.method.to_string(),
        ctx.path.to_string(),
    );
    entry.query = ctx.query.map(ToString::to_string);
    entry.http_version = version_label(ctx.version).to_string();
    entry.status = response.status().as_u16();
    entry.body_bytes = response
        .body()
        .size_hint()
        .exact()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_default();
    entry.referer = header_string(req, header::REFERER);
    entry.user_agent = header_string(req, header::USER_AGENT);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    entry
}

fn header_string<B>(req: &Request<B>, name: header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

const fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::BodyExt;
    use std::path::PathBuf;

    struct ScratchRoot(PathBuf);

    impl ScratchRoot {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "wasm-server-router-{tag}-{}",
                std::process::id()
            ));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }
    }

    impl Drop for ScratchRoot {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn state_for(root: &ScratchRoot) -> Arc<AppState> {
        let mut cfg = Config::from_defaults().unwrap();
        cfg.logging.access_log = false;
        Arc::new(AppState::new(cfg, &root.0).unwrap())
    }

    fn request(method: Method, uri: &str) -> Request<()> {
        Request::builder().method(method).uri(uri).body(()).unwrap()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn assert_isolated(resp: &Response<Full<Bytes>>) {
        assert_eq!(resp.headers()["cross-origin-opener-policy"], "same-origin");
        assert_eq!(resp.headers()["cross-origin-embedder-policy"], "require-corp");
        let names: Vec<&str> = resp.headers().keys().map(header::HeaderName::as_str).collect();
        assert_eq!(
            &names[names.len() - 2..],
            ["cross-origin-opener-policy", "cross-origin-embedder-policy"]
        );
    }

    #[tokio::test]
    async fn test_serves_wasm() {
        let root = ScratchRoot::new("wasm");
        std::fs::write(root.0.join("app.wasm"), b"\0asm\x01\0\0\0").unwrap();
        let state = state_for(&root);

        let resp = handle_request(request(Method::GET, "/app.wasm"), state, peer())
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "application/wasm");
        assert_eq!(resp.headers()["content-length"], "8");
        assert!(resp.headers().contains_key("server"));
        assert!(resp.headers().contains_key("date"));
        assert_isolated(&resp);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"\0asm\x01\0\0\0");
    }

    #[tokio::test]
    async fn test_not_found_is_isolated() {
        let root = ScratchRoot::new("missing");
        let resp = handle_request(request(Method::GET, "/nope.js"), state_for(&root), peer())
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        assert_isolated(&resp);
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let root = ScratchRoot::new("method");
        let resp = handle_request(request(Method::POST, "/"), state_for(&root), peer())
            .await
            .unwrap();
        assert_eq!(resp.status(), 501);
        assert_isolated(&resp);
    }

    #[tokio::test]
    async fn test_traversal_forbidden() {
        let root = ScratchRoot::new("traversal");
        let resp = handle_request(
            request(Method::GET, "/../../etc/passwd"),
            state_for(&root),
            peer(),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), 403);
        assert_isolated(&resp);
    }

    #[tokio::test]
    async fn test_bad_escape_is_400() {
        let root = ScratchRoot::new("escape");
        let resp = handle_request(request(Method::GET, "/%ff.txt"), state_for(&root), peer())
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_isolated(&resp);
    }

    #[tokio::test]
    async fn test_directory_redirect_keeps_query() {
        let root = ScratchRoot::new("redirect");
        std::fs::create_dir_all(root.0.join("pkg")).unwrap();
        let resp = handle_request(request(Method::GET, "/pkg?v=2"), state_for(&root), peer())
            .await
            .unwrap();
        assert_eq!(resp.status(), 301);
        assert_eq!(resp.headers()["location"], "/pkg/?v=2");
        assert_isolated(&resp);
    }

    #[tokio::test]
    async fn test_index_file_served() {
        let root = ScratchRoot::new("index");
        std::fs::write(root.0.join("index.html"), b"<h1>home</h1>").unwrap();
        let resp = handle_request(request(Method::GET, "/"), state_for(&root), peer())
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "text/html; charset=utf-8");
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_listing_disabled() {
        let root = ScratchRoot::new("nolisting");
        let mut cfg = Config::from_defaults().unwrap();
        cfg.logging.access_log = false;
        cfg.http.directory_listing = false;
        let state = Arc::new(AppState::new(cfg, &root.0).unwrap());

        let resp = handle_request(request(Method::GET, "/"), state, peer())
            .await
            .unwrap();
        assert_eq!(resp.status(), 403);
    }

    #[tokio::test]
    async fn test_file_with_trailing_slash_is_404() {
        let root = ScratchRoot::new("slash");
        std::fs::write(root.0.join("a.txt"), b"a").unwrap();
        let resp = handle_request(request(Method::GET, "/a.txt/"), state_for(&root), peer())
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_if_modified_since() {
        let root = ScratchRoot::new("conditional");
        std::fs::write(root.0.join("a.txt"), b"a").unwrap();
        let req = Request::builder()
            .uri("/a.txt")
            .header("If-Modified-Since", "Fri, 01 Jan 2100 00:00:00 GMT")
            .body(())
            .unwrap();
        let resp = handle_request(req, state_for(&root), peer()).await.unwrap();
        assert_eq!(resp.status(), 304);
        assert_isolated(&resp);
    }

    #[tokio::test]
    async fn test_double_slash_redirect_stays_local() {
        let root = ScratchRoot::new("doubleslash");
        std::fs::create_dir_all(root.0.join("pkg")).unwrap();
        let resp = handle_request(request(Method::GET, "//pkg"), state_for(&root), peer())
            .await
            .unwrap();
        assert_eq!(resp.status(), 301);
        assert_eq!(resp.headers()["location"], "/pkg/");
        assert_isolated(&resp);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_typed_by_requested_name() {
        let root = ScratchRoot::new("linktype");
        std::fs::create_dir_all(root.0.join("build")).unwrap();
        std::fs::write(root.0.join("build/out.bin"), b"\0asm\x01\0\0\0").unwrap();
        std::os::unix::fs::symlink(root.0.join("build/out.bin"), root.0.join("app.wasm")).unwrap();

        let resp = handle_request(request(Method::GET, "/app.wasm"), state_for(&root), peer())
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "application/wasm");
    }

    #[tokio::test]
    async fn test_http10_keep_alive_announced_before_isolation() {
        let root = ScratchRoot::new("keepalive");
        std::fs::write(root.0.join("a.txt"), b"a").unwrap();
        let req = Request::builder()
            .uri("/a.txt")
            .version(Version::HTTP_10)
            .header("Connection", "Keep-Alive")
            .body(())
            .unwrap();
        let resp = handle_request(req, state_for(&root), peer()).await.unwrap();
        assert_eq!(resp.headers()["connection"], "keep-alive");
        assert_isolated(&resp);
    }

    #[test]
    fn test_connection_token() {
        let req = |version: Version, conn: Option<&str>| {
            let mut builder = Request::builder().uri("/").version(version);
            if let Some(value) = conn {
                builder = builder.header("Connection", value);
            }
            builder.body(()).unwrap()
        };

        assert_eq!(connection_token(&req(Version::HTTP_11, None), true), None);
        assert_eq!(connection_token(&req(Version::HTTP_11, Some("close")), true), Some("close"));
        assert_eq!(connection_token(&req(Version::HTTP_11, None), false), Some("close"));
        assert_eq!(connection_token(&req(Version::HTTP_10, None), true), Some("close"));
        assert_eq!(
            connection_token(&req(Version::HTTP_10, Some("foo, keep-alive")), true),
            Some("keep-alive")
        );
    }

    #[test]
    fn test_version_label() {
        assert_eq!(version_label(Version::HTTP_10), "1.0");
        assert_eq!(version_label(Version::HTTP_11), "1.1");
    }
}
