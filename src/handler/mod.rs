//! Request handler module
//!
//! Maps request paths onto the served directory and produces responses.
//! The router wraps the static file handler and decorates whatever it returns.

pub mod path;
pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::handle_request;
