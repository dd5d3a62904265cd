//! # API Module
//!
//! The HTTP transport for the records server, built on `axum`.
//!
//! ## Contained Modules:
//!
//! - **`wire`**: JSON shapes sent and received over HTTP.
//! - **`encoder`**: the stream encoder that turns a search stream into an
//!   incrementally flushed JSON array body.
//! - **`auth`**: HTTP Basic authentication middleware.
//! - **`error`**: `AppError` and its mapping onto HTTP status codes.
//! - **`handlers`**: the router and its request handlers.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

/// HTTP Basic authentication middleware.
pub mod auth;
/// Streamed JSON array encoder for search results.
pub mod encoder;
/// Transport error type and status mapping.
pub mod error;
/// Router and request handlers.
pub mod handlers;
/// Wire (JSON) representations.
pub mod wire;

pub use auth::BasicCredentials;
pub use encoder::{encode_search, EncoderOptions};
pub use error::AppError;
pub use handlers::{router, ApiState};
pub use wire::{DeleteAck, WireRecord};
