//! Cross-origin isolation headers
//!
//! Browsers only enable `SharedArrayBuffer` and high-resolution timers on
//! pages served with both headers below. They are added to every response,
//! after all other headers.

use hyper::header::{HeaderName, HeaderValue};
use hyper::Response;

pub const CROSS_ORIGIN_OPENER_POLICY: &str = "cross-origin-opener-policy";
pub const CROSS_ORIGIN_EMBEDDER_POLICY: &str = "cross-origin-embedder-policy";

pub const SAME_ORIGIN: &str = "same-origin";
pub const REQUIRE_CORP: &str = "require-corp";

/// Append the COOP/COEP pair to a finished response
pub fn apply<B>(response: &mut Response<B>) {
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static(CROSS_ORIGIN_OPENER_POLICY),
        HeaderValue::from_static(SAME_ORIGIN),
    );
    headers.insert(
        HeaderName::from_static(CROSS_ORIGIN_EMBEDDER_POLICY),
        HeaderValue::from_static(REQUIRE_CORP),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_appended_last() {
        let mut response = Response::builder()
            .status(404)
            .header("Content-Type", "text/html")
            .header("Content-Length", "0")
            .body(())
            .unwrap();

        apply(&mut response);

        let names: Vec<&str> = response.headers().keys().map(HeaderName::as_str).collect();
        assert_eq!(
            names,
            vec![
                "content-type",
                "content-length",
                "cross-origin-opener-policy",
                "cross-origin-embedder-policy",
            ]
        );
        assert_eq!(response.headers()["cross-origin-opener-policy"], "same-origin");
        assert_eq!(response.headers()["cross-origin-embedder-policy"], "require-corp");
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut response = Response::new(());
        apply(&mut response);
        apply(&mut response);
        assert_eq!(response.headers().len(), 2);
    }
}
