//! # Record Store
//!
//! Owns the keyed collection of records. All access (point operations and search
//! scans) is serialised by a single async mutex held by the store instance; there
//! is no global instance.
//!
//! Point operations hold the lock for one map access. A search scan, depending on
//! [`ScanMode`], either holds the lock for its whole lifetime (hand-offs included)
//! or copies its matches under a brief lock and hands them off unlocked.
//!
//! Every operation checks the request's cancellation token at call time, before
//! waiting for the lock, and fails with [`StoreError::Cancelled`] if the token has
//! already fired. A token that fires while the caller waits for the lock does not
//! fail a point operation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::StoreError;
use super::model::{NewRecord, Record, RecordId, DEFAULT_PERMISSIONS};
use super::pipeline::{
    search_channel, HandoffPolicy, PipelineConfig, ScanMode, SearchSender, SearchStream, StreamEnd,
};

/// Storage seam consumed by the service layer.
pub trait RecordStore: Send + Sync + 'static {
    /// Assigns a fresh identifier, inserts the record and returns the identifier.
    fn create(
        &self,
        cancel: &CancellationToken,
        record: NewRecord,
    ) -> impl Future<Output = Result<RecordId, StoreError>> + Send;

    /// Returns a copy of the record, or [`StoreError::NotFound`].
    fn read(
        &self,
        cancel: &CancellationToken,
        id: RecordId,
    ) -> impl Future<Output = Result<Record, StoreError>> + Send;

    /// Removes the record if present. Deleting an absent id succeeds.
    fn delete(
        &self,
        cancel: &CancellationToken,
        id: RecordId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Starts a scan for records whose name contains `needle` (case-sensitive) and
    /// returns the lazy result stream. Matches are handed off one at a time.
    fn search(
        &self,
        cancel: &CancellationToken,
        needle: &str,
    ) -> impl Future<Output = Result<SearchStream, StoreError>> + Send;

    /// Permission bits assigned to newly created records.
    fn default_permissions(&self) -> u32;
}

/// # In-Memory Record Store
///
/// `HashMap` behind a `tokio::sync::Mutex`. Cloning shares the same collection.
#[derive(Debug, Clone)]
pub struct MemRecordStore {
    records: Arc<Mutex<HashMap<RecordId, Record>>>,
    pipeline: PipelineConfig,
    default_permissions: u32,
}

impl Default for MemRecordStore {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl MemRecordStore {
    /// Empty store scanning under `pipeline`'s hand-off policy, scan mode and
    /// store channel capacity.
    pub fn new(pipeline: PipelineConfig) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            pipeline,
            default_permissions: DEFAULT_PERMISSIONS,
        }
    }

    /// Overrides the permission bits assigned on creation.
    pub fn with_default_permissions(mut self, permissions: u32) -> Self {
        self.default_permissions = permissions;
        self
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    Ok(())
}

impl RecordStore for MemRecordStore {
    async fn create(
        &self,
        cancel: &CancellationToken,
        record: NewRecord,
    ) -> Result<RecordId, StoreError> {
        ensure_live(cancel)?;
        let mut records = self.records.lock().await;

        let mut id = RecordId::generate();
        while records.contains_key(&id) {
            id = RecordId::generate();
        }
        records.insert(id, record.into_record(id, self.default_permissions));
        debug!(%id, "record created");
        Ok(id)
    }

    async fn read(&self, cancel: &CancellationToken, id: RecordId) -> Result<Record, StoreError> {
        ensure_live(cancel)?;
        let records = self.records.lock().await;
        records.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn delete(&self, cancel: &CancellationToken, id: RecordId) -> Result<(), StoreError> {
        ensure_live(cancel)?;
        let mut records = self.records.lock().await;
        if records.remove(&id).is_none() {
            debug!(%id, "delete of absent record ignored");
        }
        Ok(())
    }

    async fn search(
        &self,
        cancel: &CancellationToken,
        needle: &str,
    ) -> Result<SearchStream, StoreError> {
        ensure_live(cancel)?;
        let (tx, stream) = search_channel(self.pipeline.store_capacity);
        let needle = needle.to_owned();
        let policy = self.pipeline.handoff;

        match self.pipeline.scan_mode {
            ScanMode::HoldLock => {
                let guard = Arc::clone(&self.records).lock_owned().await;
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let matches = guard
                        .values()
                        .filter(|record| record.name.contains(needle.as_str()))
                        .cloned();
                    scan(matches, tx, &cancel, policy, &needle).await;
                    drop(guard);
                });
            }
            ScanMode::Snapshot => {
                let matches: Vec<Record> = {
                    let records = self.records.lock().await;
                    records
                        .values()
                        .filter(|record| record.name.contains(needle.as_str()))
                        .cloned()
                        .collect()
                };
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    scan(matches.into_iter(), tx, &cancel, policy, &needle).await;
                });
            }
        }
        Ok(stream)
    }

    fn default_permissions(&self) -> u32 {
        self.default_permissions
    }
}

/// Hands every match to the consumer until one hand-off fails, then reports why.
async fn scan<I>(
    matches: I,
    mut tx: SearchSender,
    cancel: &CancellationToken,
    policy: HandoffPolicy,
    needle: &str,
) where
    I: Iterator<Item = Record>,
{
    let mut end = StreamEnd::Complete;
    for record in matches {
        if let Some(stop) = tx.hand_off(record, cancel, policy).await.end() {
            end = stop;
            break;
        }
    }

    let delivered = tx.delivered();
    match end {
        StreamEnd::TimedOut => warn!(
            needle,
            delivered, "search scan truncated: consumer missed the hand-off deadline"
        ),
        _ => debug!(needle, delivered, ?end, "search scan finished"),
    }
    tx.finish(end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::task::JoinSet;

    fn pipeline(
        handoff: HandoffPolicy,
        scan_mode: ScanMode,
        store_capacity: usize,
    ) -> PipelineConfig {
        PipelineConfig {
            handoff,
            scan_mode,
            store_capacity,
            ..PipelineConfig::default()
        }
    }

    async fn seed(store: &MemRecordStore, names: &[&str]) -> Vec<RecordId> {
        let cancel = CancellationToken::new();
        let mut ids = Vec::new();
        for name in names {
            ids.push(store.create(&cancel, NewRecord::new(*name, "d")).await.expect("create"));
        }
        ids
    }

    #[tokio::test]
    async fn read_returns_created_record_with_default_permissions() {
        let store = MemRecordStore::default();
        let cancel = CancellationToken::new();
        let id = store.create(&cancel, NewRecord::new("x", "y")).await.expect("create");
        assert!(!id.is_nil());

        let record = store.read(&cancel, id).await.expect("read");
        assert_eq!(
            record,
            Record { id, name: "x".into(), data: "y".into(), permissions: DEFAULT_PERMISSIONS }
        );
    }

    #[tokio::test]
    async fn configured_default_permissions_apply_on_create() {
        let store = MemRecordStore::default().with_default_permissions(0o600);
        let cancel = CancellationToken::new();
        let id = store.create(&cancel, NewRecord::new("x", "y")).await.expect("create");
        assert_eq!(store.read(&cancel, id).await.expect("read").permissions, 0o600);
        assert_eq!(store.default_permissions(), 0o600);
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_read_misses_afterwards() {
        let store = MemRecordStore::default();
        let cancel = CancellationToken::new();

        let absent = RecordId::generate();
        assert_eq!(store.delete(&cancel, absent).await, Ok(()));

        let id = store.create(&cancel, NewRecord::new("x", "y")).await.expect("create");
        assert_eq!(store.delete(&cancel, id).await, Ok(()));
        assert_eq!(store.delete(&cancel, id).await, Ok(()));
        assert_eq!(store.read(&cancel, id).await, Err(StoreError::NotFound(id)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn cancelled_token_is_rejected_before_any_work() {
        let store = MemRecordStore::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(
            store.create(&cancel, NewRecord::new("x", "y")).await,
            Err(StoreError::Cancelled)
        );
        assert_eq!(store.len().await, 0);
        assert_eq!(store.read(&cancel, RecordId::generate()).await, Err(StoreError::Cancelled));
        assert_eq!(store.delete(&cancel, RecordId::generate()).await, Err(StoreError::Cancelled));
        assert!(matches!(store.search(&cancel, "x").await, Err(StoreError::Cancelled)));
    }

    #[tokio::test]
    async fn concurrent_creates_never_collide() {
        let store = MemRecordStore::default();
        let mut tasks = JoinSet::new();
        for i in 0..64 {
            let store = store.clone();
            tasks.spawn(async move {
                let cancel = CancellationToken::new();
                store.create(&cancel, NewRecord::new(format!("user{}", i), "d")).await
            });
        }

        let mut ids = HashSet::new();
        while let Some(joined) = tasks.join_next().await {
            ids.insert(joined.expect("task").expect("create"));
        }
        assert_eq!(ids.len(), 64);
        assert_eq!(store.len().await, 64);
    }

    #[tokio::test]
    async fn search_matches_case_sensitive_substrings() {
        let store = MemRecordStore::default();
        seed(&store, &["alice", "bob", "alicia"]).await;
        let cancel = CancellationToken::new();

        let (records, end) = store.search(&cancel, "ali").await.expect("search").collect().await;
        let mut names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["alice", "alicia"]);
        assert_eq!(end, StreamEnd::Complete);
        // The store itself does not touch permissions.
        assert!(records.iter().all(|r| r.permissions == DEFAULT_PERMISSIONS));

        let (records, _) = store.search(&cancel, "Ali").await.expect("search").collect().await;
        assert!(records.is_empty());

        let (records, _) = store.search(&cancel, "").await.expect("search").collect().await;
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn slow_consumer_truncates_scan_under_drop_policy() {
        let policy = HandoffPolicy::DropAfterTimeout(Duration::from_millis(30));
        let store = MemRecordStore::new(pipeline(policy, ScanMode::HoldLock, 1));
        seed(&store, &["m1", "m2", "m3", "m4", "m5"]).await;
        let cancel = CancellationToken::new();

        let stream = store.search(&cancel, "m").await.expect("search");
        tokio::time::sleep(Duration::from_millis(150)).await;
        let (records, end) = stream.collect().await;
        assert_eq!(records.len(), 1);
        assert_eq!(end, StreamEnd::TimedOut);
    }

    #[tokio::test]
    async fn slow_consumer_gets_everything_under_block_policy() {
        let store = MemRecordStore::new(pipeline(
            HandoffPolicy::BlockUntilDelivered,
            ScanMode::HoldLock,
            1,
        ));
        seed(&store, &["m1", "m2", "m3", "m4", "m5"]).await;
        let cancel = CancellationToken::new();

        let stream = store.search(&cancel, "m").await.expect("search");
        tokio::time::sleep(Duration::from_millis(60)).await;
        let (records, end) = stream.collect().await;
        assert_eq!(records.len(), 5);
        assert_eq!(end, StreamEnd::Complete);
    }

    #[tokio::test]
    async fn hold_lock_scan_blocks_writers_until_drained() {
        let store = MemRecordStore::new(pipeline(
            HandoffPolicy::BlockUntilDelivered,
            ScanMode::HoldLock,
            1,
        ));
        seed(&store, &["m1", "m2", "m3"]).await;
        let cancel = CancellationToken::new();

        let stream = store.search(&cancel, "m").await.expect("search");
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            store.create(&cancel, NewRecord::new("zed", "d")),
        )
        .await;
        assert!(blocked.is_err(), "writer should wait for the scan to release the lock");

        let (records, end) = stream.collect().await;
        assert_eq!(records.len(), 3);
        assert_eq!(end, StreamEnd::Complete);

        let id = tokio::time::timeout(
            Duration::from_secs(1),
            store.create(&cancel, NewRecord::new("zed", "d")),
        )
        .await
        .expect("lock released after scan")
        .expect("create");
        assert!(!id.is_nil());
    }

    #[tokio::test]
    async fn cancellation_while_waiting_for_the_lock_does_not_fail_a_write() {
        let store = MemRecordStore::new(pipeline(
            HandoffPolicy::BlockUntilDelivered,
            ScanMode::HoldLock,
            1,
        ));
        seed(&store, &["m1", "m2", "m3"]).await;
        let scan_cancel = CancellationToken::new();
        let stream = store.search(&scan_cancel, "m").await.expect("search");

        // Live at call time, cancelled while queued behind the scan.
        let writer_cancel = CancellationToken::new();
        let writer = {
            let store = store.clone();
            let cancel = writer_cancel.clone();
            tokio::spawn(async move { store.create(&cancel, NewRecord::new("zed", "d")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!writer.is_finished(), "writer should wait for the scan to release the lock");
        writer_cancel.cancel();

        let (records, end) = stream.collect().await;
        assert_eq!(records.len(), 3);
        assert_eq!(end, StreamEnd::Complete);

        let id = tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .expect("writer finished")
            .expect("writer task")
            .expect("create succeeds");
        let fresh = CancellationToken::new();
        assert_eq!(store.read(&fresh, id).await.expect("read").name, "zed");
    }

    #[tokio::test]
    async fn snapshot_scan_does_not_block_writers() {
        let store = MemRecordStore::new(pipeline(
            HandoffPolicy::BlockUntilDelivered,
            ScanMode::Snapshot,
            1,
        ));
        seed(&store, &["m1", "m2", "m3"]).await;
        let cancel = CancellationToken::new();

        let stream = store.search(&cancel, "m").await.expect("search");
        let created = tokio::time::timeout(
            Duration::from_millis(500),
            store.create(&cancel, NewRecord::new("m4", "d")),
        )
        .await;
        assert!(created.is_ok(), "snapshot scan must not hold the lock");

        // The snapshot was taken before "m4" existed.
        let (records, end) = stream.collect().await;
        assert_eq!(records.len(), 3);
        assert_eq!(end, StreamEnd::Complete);
    }

    #[tokio::test]
    async fn cancellation_mid_scan_stops_the_producer() {
        let store = MemRecordStore::new(pipeline(
            HandoffPolicy::BlockUntilDelivered,
            ScanMode::HoldLock,
            1,
        ));
        seed(&store, &["m1", "m2", "m3", "m4", "m5"]).await;
        let cancel = CancellationToken::new();

        let mut stream = store.search(&cancel, "m").await.expect("search");
        assert!(stream.recv().await.is_some());
        cancel.cancel();

        let mut rest = 0;
        while stream.recv().await.is_some() {
            rest += 1;
        }
        assert!(rest <= 1, "at most the already-buffered record may follow");
        assert_eq!(stream.finish().await, StreamEnd::Cancelled);

        // Lock released once the producer stopped.
        let fresh = CancellationToken::new();
        assert_eq!(store.len().await, 5);
        assert!(store.delete(&fresh, RecordId::generate()).await.is_ok());
    }
}
