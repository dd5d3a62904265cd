//! # Search Pipeline Coordination
//!
//! The glue between the three search stages (store scan, relay, encoder).
//!
//! ## Design:
//!
//! 1.  **Bounded Hand-off**: every stage boundary is a bounded `mpsc` channel. A
//!     producer that outruns its consumer suspends in [`SearchSender::hand_off`],
//!     the only place a producer ever waits.
//!
//! 2.  **Cooperative Cancellation**: `hand_off` races the request's
//!     `CancellationToken` (biased, so a fired token always wins) against the send.
//!     No stage can block forever on another once the token fires.
//!
//! 3.  **Explicit End Reason**: closing the item channel says "no more items" but
//!     not why. Each producer reports a [`StreamEnd`] on a `oneshot` before its item
//!     channel closes, so a consumer that drained the stream can ask whether the
//!     result set is complete or was truncated by timeout or cancellation.
//!
//! 4.  **Hand-off Policy**: [`HandoffPolicy::DropAfterTimeout`] gives up on a slow
//!     consumer after a per-item deadline and ends the scan early (silent truncation
//!     unless the consumer checks the end reason). [`HandoffPolicy::BlockUntilDelivered`]
//!     waits for the consumer for as long as the request lives. The default is
//!     `DropAfterTimeout(2s)`.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::model::Record;

/// Per-item hand-off deadline used by the store scan by default.
pub const DEFAULT_HANDOFF_TIMEOUT: Duration = Duration::from_secs(2);

/// Default capacity of each stage's output channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// What a producer does when its consumer is not ready to accept an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffPolicy {
    /// Wait at most the given duration per item, then end the stream with
    /// [`StreamEnd::TimedOut`].
    DropAfterTimeout(Duration),
    /// Wait until the item is accepted, the consumer goes away, or the request is
    /// cancelled.
    BlockUntilDelivered,
}

impl Default for HandoffPolicy {
    fn default() -> Self {
        HandoffPolicy::DropAfterTimeout(DEFAULT_HANDOFF_TIMEOUT)
    }
}

/// How the store holds its lock while scanning for matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Hold the collection lock for the whole scan, hand-offs included. Writers
    /// block until the scan ends, so a slow-draining search stalls them (bounded by
    /// the hand-off timeout under `DropAfterTimeout`).
    #[default]
    HoldLock,
    /// Copy the matching records under a brief lock and hand them off unlocked.
    /// Writers never wait on a consumer, but results reflect the collection as of
    /// the start of the scan.
    Snapshot,
}

/// Sizing and timeout policy for one search pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Store scan hand-off policy.
    pub handoff: HandoffPolicy,
    /// Store lock policy during a scan.
    pub scan_mode: ScanMode,
    /// Capacity of the store → relay channel.
    pub store_capacity: usize,
    /// Capacity of the relay → encoder channel.
    pub relay_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            handoff: HandoffPolicy::default(),
            scan_mode: ScanMode::default(),
            store_capacity: DEFAULT_CHANNEL_CAPACITY,
            relay_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Why a search stream stopped producing items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Every match was delivered.
    Complete,
    /// A hand-off exceeded its deadline; later matches were dropped.
    TimedOut,
    /// The request's cancellation signal fired.
    Cancelled,
    /// The consumer dropped its end of the stream.
    ConsumerGone,
    /// The producer went away without reporting (e.g. its task panicked).
    Aborted,
}

impl StreamEnd {
    /// `true` only for [`StreamEnd::Complete`].
    pub fn is_complete(self) -> bool {
        matches!(self, StreamEnd::Complete)
    }
}

/// Result of a single [`SearchSender::hand_off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// The consumer accepted the item.
    Delivered,
    /// The cancellation signal fired first.
    Cancelled,
    /// The per-item deadline elapsed first.
    TimedOut,
    /// The consumer is gone.
    Closed,
}

impl Handoff {
    /// The stream end implied by a failed hand-off; `None` for `Delivered`.
    pub fn end(self) -> Option<StreamEnd> {
        match self {
            Handoff::Delivered => None,
            Handoff::Cancelled => Some(StreamEnd::Cancelled),
            Handoff::TimedOut => Some(StreamEnd::TimedOut),
            Handoff::Closed => Some(StreamEnd::ConsumerGone),
        }
    }
}

/// Creates a bounded search channel. `capacity` is clamped to at least 1.
pub fn search_channel(capacity: usize) -> (SearchSender, SearchStream) {
    let (items_tx, items_rx) = mpsc::channel(capacity.max(1));
    let (end_tx, end_rx) = oneshot::channel();
    (
        SearchSender {
            items: items_tx,
            end: end_tx,
            delivered: 0,
        },
        SearchStream {
            items: items_rx,
            end: Some(end_rx),
            settled: None,
        },
    )
}

/// # Search Sender
///
/// Producing half of a search channel, owned by the store scan or the relay task.
#[derive(Debug)]
pub struct SearchSender {
    items: mpsc::Sender<Record>,
    end: oneshot::Sender<StreamEnd>,
    delivered: usize,
}

impl SearchSender {
    /// Hands one record to the consumer under `policy`, racing `cancel`.
    pub async fn hand_off(
        &mut self,
        record: Record,
        cancel: &CancellationToken,
        policy: HandoffPolicy,
    ) -> Handoff {
        let outcome = match policy {
            HandoffPolicy::DropAfterTimeout(limit) => tokio::select! {
                biased;
                _ = cancel.cancelled() => Handoff::Cancelled,
                sent = tokio::time::timeout(limit, self.items.send(record)) => match sent {
                    Ok(Ok(())) => Handoff::Delivered,
                    Ok(Err(_)) => Handoff::Closed,
                    Err(_) => Handoff::TimedOut,
                },
            },
            HandoffPolicy::BlockUntilDelivered => tokio::select! {
                biased;
                _ = cancel.cancelled() => Handoff::Cancelled,
                sent = self.items.send(record) => match sent {
                    Ok(()) => Handoff::Delivered,
                    Err(_) => Handoff::Closed,
                },
            },
        };
        if outcome == Handoff::Delivered {
            self.delivered += 1;
        }
        outcome
    }

    /// Number of records accepted by the consumer so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Reports why the stream ended, then closes it.
    pub fn finish(self, end: StreamEnd) {
        let SearchSender { items, end: end_tx, .. } = self;
        // The end reason must be in place before the consumer can observe the close.
        let _ = end_tx.send(end);
        drop(items);
    }
}

/// # Search Stream
///
/// Lazy, single-pass, non-restartable sequence of search results.
#[derive(Debug)]
pub struct SearchStream {
    items: mpsc::Receiver<Record>,
    end: Option<oneshot::Receiver<StreamEnd>>,
    settled: Option<StreamEnd>,
}

impl SearchStream {
    /// Next record, or `None` once the producer has finished.
    pub async fn recv(&mut self) -> Option<Record> {
        self.items.recv().await
    }

    /// Why the producer stopped.
    ///
    /// Closes the stream: records still buffered can be drained with `recv`, but
    /// the producer cannot deliver anything new. Call it after `recv` returned
    /// `None` to learn whether the result set is complete.
    pub async fn finish(&mut self) -> StreamEnd {
        if let Some(end) = self.settled {
            return end;
        }
        self.items.close();
        let end = match self.end.take() {
            Some(rx) => rx.await.unwrap_or(StreamEnd::Aborted),
            None => StreamEnd::Aborted,
        };
        self.settled = Some(end);
        end
    }

    /// Drains the whole stream into memory. Intended for tests and small callers;
    /// the HTTP path streams instead.
    pub async fn collect(mut self) -> (Vec<Record>, StreamEnd) {
        let mut records = Vec::new();
        while let Some(record) = self.recv().await {
            records.push(record);
        }
        let end = self.finish().await;
        (records, end)
    }
}
