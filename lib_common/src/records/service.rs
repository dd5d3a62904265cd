//! # Records Service
//!
//! The service layer between the transport and a [`RecordStore`]. Point operations
//! pass straight through with store errors wrapped in operation context. Search
//! inserts the relay stage: a task that consumes the store's raw stream, stamps
//! [`SEARCH_PERMISSIONS`] on every record and forwards it on its own bounded
//! channel.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::{Operation, ServiceError};
use super::model::{NewRecord, Record, RecordId, SEARCH_PERMISSIONS};
use super::pipeline::{
    search_channel, HandoffPolicy, SearchSender, SearchStream, StreamEnd, DEFAULT_CHANNEL_CAPACITY,
};
use super::store::RecordStore;

/// # Records
///
/// Cheap to clone; clones share the same store.
#[derive(Debug)]
pub struct Records<S> {
    store: Arc<S>,
    relay_capacity: usize,
}

impl<S> Clone for Records<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            relay_capacity: self.relay_capacity,
        }
    }
}

impl<S: RecordStore> Records<S> {
    /// Wraps `store` with the default relay channel capacity.
    pub fn new(store: S) -> Self {
        Self::with_relay_capacity(store, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Wraps `store`; the relay buffers up to `relay_capacity` records (at least 1).
    pub fn with_relay_capacity(store: S, relay_capacity: usize) -> Self {
        Self {
            store: Arc::new(store),
            relay_capacity: relay_capacity.max(1),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a record and returns it with its assigned identifier.
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        record: NewRecord,
    ) -> Result<Record, ServiceError> {
        let id = self
            .store
            .create(cancel, record.clone())
            .await
            .map_err(|e| ServiceError::new(Operation::Create, e))?;
        Ok(record.into_record(id, self.store.default_permissions()))
    }

    /// Point read.
    pub async fn read(
        &self,
        cancel: &CancellationToken,
        id: RecordId,
    ) -> Result<Record, ServiceError> {
        self.store
            .read(cancel, id)
            .await
            .map_err(|e| ServiceError::new(Operation::Read, e))
    }

    /// Idempotent delete: an absent id is not an error.
    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        id: RecordId,
    ) -> Result<(), ServiceError> {
        self.store
            .delete(cancel, id)
            .await
            .map_err(|e| ServiceError::new(Operation::Delete, e))
    }

    /// Starts a search and returns the relayed stream. Every record on it carries
    /// [`SEARCH_PERMISSIONS`] regardless of its stored value.
    pub async fn search(
        &self,
        cancel: &CancellationToken,
        needle: &str,
    ) -> Result<SearchStream, ServiceError> {
        let upstream = self
            .store
            .search(cancel, needle)
            .await
            .map_err(|e| ServiceError::new(Operation::Search, e))?;

        let (tx, downstream) = search_channel(self.relay_capacity);
        info!(needle, "search started");
        tokio::spawn(relay(upstream, tx, cancel.clone()));
        Ok(downstream)
    }
}

/// Relay stage: forwards until upstream closes, cancellation fires, or the
/// downstream consumer goes away.
async fn relay(mut upstream: SearchStream, mut tx: SearchSender, cancel: CancellationToken) {
    let end = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break StreamEnd::Cancelled,
            next = upstream.recv() => next,
        };

        let Some(mut record) = next else {
            break upstream.finish().await;
        };
        record.permissions = SEARCH_PERMISSIONS;

        let handoff = tx
            .hand_off(record, &cancel, HandoffPolicy::BlockUntilDelivered)
            .await;
        if let Some(stop) = handoff.end() {
            break stop;
        }
    };

    debug!(delivered = tx.delivered(), ?end, "search relay finished");
    tx.finish(end);
}
