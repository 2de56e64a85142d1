//! HTTP response building module
//!
//! Builders for the responses the static file handler produces. Base headers
//! (`Server`, `Date`, `Connection`) are stamped afterwards by
//! [`apply_base_headers`].

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use std::time::SystemTime;

use super::conditional::format_http_date;

/// Build 200 response for a file
pub fn build_file_response(
    data: Bytes,
    content_type: &str,
    last_modified: SystemTime,
    is_head: bool,
) -> Response<Full<Bytes>> {
    let content_length = data.len();
    let body = if is_head { Bytes::new() } else { data };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, content_length)
        .header(header::LAST_MODIFIED, format_http_date(last_modified))
        .body(Full::new(body))
        .unwrap_or_else(|e| {
            log_build_error("200", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build 304 Not Modified response
pub fn build_304_response(last_modified: SystemTime) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header(header::LAST_MODIFIED, format_http_date(last_modified))
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error("304", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build 301 redirect, used to add the trailing slash to directory paths
pub fn build_redirect_response(location: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(header::LOCATION, location)
        .header(header::CONTENT_LENGTH, 0)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error("301", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build generic HTML response
pub fn build_html_response(content: String, is_head: bool) -> Response<Full<Bytes>> {
    let content_length = content.len();
    let body = if is_head {
        Bytes::new()
    } else {
        Bytes::from(content)
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CONTENT_LENGTH, content_length)
        .body(Full::new(body))
        .unwrap_or_else(|e| {
            log_build_error("HTML", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build an HTML error page for any 4xx/5xx status
pub fn build_error_response(
    status: StatusCode,
    message: &str,
    is_head: bool,
) -> Response<Full<Bytes>> {
    let page = render_error_page(status, message);
    let content_length = page.len();
    let body = if is_head {
        Bytes::new()
    } else {
        Bytes::from(page)
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CONTENT_LENGTH, content_length);

    if status == StatusCode::NOT_IMPLEMENTED {
        builder = builder.header(header::ALLOW, "GET, HEAD");
    }

    builder.body(Full::new(body)).unwrap_or_else(|e| {
        log_build_error(status.as_str(), &e);
        let mut fallback = Response::new(Full::new(Bytes::new()));
        *fallback.status_mut() = status;
        fallback
    })
}

/// Build 501 response for methods other than GET and HEAD
pub fn build_501_response() -> Response<Full<Bytes>> {
    build_error_response(StatusCode::NOT_IMPLEMENTED, "Unsupported method", false)
}

/// Add `Server` and `Date` unless the response already carries them, plus
/// `Connection` when the connection's persistence has to be announced.
///
/// Setting `Connection` here keeps hyper from appending its own after the
/// isolation headers.
pub fn apply_base_headers<B>(
    response: &mut Response<B>,
    server_name: &str,
    connection: Option<&'static str>,
) {
    let headers = response.headers_mut();
    if !headers.contains_key(header::SERVER) {
        match HeaderValue::from_str(server_name) {
            Ok(value) => {
                headers.insert(header::SERVER, value);
            }
            Err(e) => {
                crate::logger::log_warning(&format!("Invalid server name '{server_name}': {e}"));
            }
        }
    }
    if !headers.contains_key(header::DATE) {
        if let Ok(value) = HeaderValue::from_str(&format_http_date(SystemTime::now())) {
            headers.insert(header::DATE, value);
        }
    }
    if let Some(token) = connection {
        headers.insert(header::CONNECTION, HeaderValue::from_static(token));
    }
}

/// HTML body of an error response
pub fn render_error_page(status: StatusCode, message: &str) -> String {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or("Error");
    format!(
        "<!DOCTYPE HTML>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>Error response</title>\n\
         </head>\n\
         <body>\n\
         <h1>Error response</h1>\n\
         <p>Error code: {code}</p>\n\
         <p>Message: {message}.</p>\n\
         <p>Error code explanation: {code} - {reason}.</p>\n\
         </body>\n\
         </html>\n"
    )
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
