use std::fmt;

use thiserror::Error;

use super::model::RecordId;

/// Errors raised by a [`RecordStore`](super::store::RecordStore).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Point read of an id that is not in the collection.
    #[error("record {0} not found")]
    NotFound(RecordId),

    /// The request's cancellation signal fired before or during the operation.
    #[error("operation cancelled")]
    Cancelled,
}

/// The service operation a [`ServiceError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `Records::create`
    Create,
    /// `Records::read`
    Read,
    /// `Records::delete`
    Delete,
    /// `Records::search`
    Search,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Delete => "delete",
            Operation::Search => "search",
        };
        f.write_str(name)
    }
}

/// A store error wrapped with the service operation that surfaced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{op} record error: {source}")]
pub struct ServiceError {
    /// Operation that failed.
    pub op: Operation,
    /// Underlying store error, unchanged.
    #[source]
    pub source: StoreError,
}

impl ServiceError {
    /// Wraps `source` with operation context.
    pub fn new(op: Operation, source: StoreError) -> Self {
        Self { op, source }
    }

    /// The point read missed.
    pub fn is_not_found(&self) -> bool {
        matches!(self.source, StoreError::NotFound(_))
    }

    /// The caller gave up (or the server is shutting down).
    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, StoreError::Cancelled)
    }
}
