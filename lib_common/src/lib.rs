//! # lib_common
//!
//! Shared building blocks for the records server: the lock-guarded record store,
//! the streaming search pipeline that sits on top of it, and the HTTP transport
//! that serialises search results incrementally.
//!
//! Modules are gated behind cargo features so binaries only pull in what they use:
//!
//! - **`records`**: store, search relay and pipeline coordination.
//! - **`api`**: axum router, stream encoder, basic auth and error mapping.

#[cfg(feature = "records")]
pub mod records;

#[cfg(feature = "api")]
pub mod api;

// Re-export the types most callers need.
#[cfg(feature = "records")]
pub use records::{
    MemRecordStore, NewRecord, PipelineConfig, Record, RecordId, RecordStore, Records,
    SearchStream, StreamEnd,
};
