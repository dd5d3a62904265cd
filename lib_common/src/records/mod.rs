//! # Records Module
//!
//! The storage and service layers of the records server.
//!
//! ## Contained Modules:
//!
//! - **`model`**: `Record`, `RecordId` and the creation payload.
//! - **`error`**: store errors and their service-level wrapping.
//! - **`pipeline`**: bounded hand-off channels, end-of-stream reporting and the
//!   timeout/backpressure policy shared by every stage of a search.
//! - **`store`**: the `RecordStore` seam and its in-memory implementation.
//! - **`service`**: the `Records` service, including the search relay stage.
//!
//! Data flows one way, store → relay → encoder. Every stage observes the same
//! request `CancellationToken` at each suspension point.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

/// Record, identifier and creation payload types.
pub mod model;
/// Store and service error types.
pub mod error;
/// Channels, policies and end reasons tying the search stages together.
pub mod pipeline;
/// The record store seam and the in-memory implementation.
pub mod store;
/// The service layer and search relay.
pub mod service;

// --- Public API Re-exports ---
pub use error::{Operation, ServiceError, StoreError};
pub use model::{NewRecord, Record, RecordId, DEFAULT_PERMISSIONS, SEARCH_PERMISSIONS};
pub use pipeline::{
    search_channel, Handoff, HandoffPolicy, PipelineConfig, ScanMode, SearchSender, SearchStream,
    StreamEnd,
};
pub use service::Records;
pub use store::{MemRecordStore, RecordStore};
