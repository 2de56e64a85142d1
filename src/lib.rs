//! Static file server for WebAssembly development.
//!
//! Serves the working directory over HTTP/1.x, sends `.wasm` files as
//! `application/wasm`, and adds the `Cross-Origin-Opener-Policy` and
//! `Cross-Origin-Embedder-Policy` headers that make pages cross-origin
//! isolated.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;

pub use error::ServerError;
pub use server::{RunningServer, Server};
