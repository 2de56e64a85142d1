//! HTTP protocol layer module
//!
//! Content types, conditional requests, response builders and the
//! cross-origin isolation headers, independent of how files are located.

pub mod conditional;
pub mod isolation;
pub mod mime;
pub mod response;

// Re-export commonly used types
pub use mime::ExtensionMap;
pub use response::{
    apply_base_headers, build_304_response, build_501_response, build_error_response,
    build_file_response, build_html_response, build_redirect_response, render_error_page,
};
