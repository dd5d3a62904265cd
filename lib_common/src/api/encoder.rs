//! # Search Stream Encoder
//!
//! Serialises a [`SearchStream`] as one JSON array without holding the result set
//! in memory. Each element becomes its own body chunk, so hyper flushes it to the
//! client as soon as it is produced.
//!
//! ## Protocol:
//!
//! - `[` is emitted immediately, before the first match is known.
//! - Each record is emitted as a `WireRecord` object, preceded by `,` after the first.
//! - `]` is emitted only when the stream ends cleanly.
//! - If the request's cancellation token fires, the body simply ends: the array is
//!   left unterminated and no record is emitted after the cancellation was observed.
//!
//! With [`EncoderOptions::strict_truncation`] the encoder also leaves the array
//! unterminated when the pipeline reports any end other than `Complete` (for
//! example a hand-off timeout in the store), so truncation is visible on the wire.
//! Without it, a timed-out scan still produces a well-formed array.
//!
//! The body owns a `DropGuard` for the request token. When the client disconnects,
//! hyper drops the body, the token fires, and the relay and store scan stop.

use std::io;

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use super::wire::WireRecord;
use crate::records::{Record, SearchStream};

/// Encoder behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncoderOptions {
    /// Omit the closing `]` when the pipeline ended for any reason other than
    /// having delivered every match.
    pub strict_truncation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Items,
    Done,
}

struct Encoder {
    stream: SearchStream,
    cancel: CancellationToken,
    options: EncoderOptions,
    phase: Phase,
    emitted: usize,
    _guard: DropGuard,
}

/// Turns `stream` into a body stream of JSON array chunks, observing `cancel`
/// before every item. Dropping the returned stream cancels `cancel`.
pub fn encode_search(
    stream: SearchStream,
    cancel: CancellationToken,
    options: EncoderOptions,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    let encoder = Encoder {
        stream,
        _guard: cancel.clone().drop_guard(),
        cancel,
        options,
        phase: Phase::Open,
        emitted: 0,
    };
    stream::unfold(encoder, |mut encoder| async move {
        let chunk = encoder.next_chunk().await?;
        Some((Ok(chunk), encoder))
    })
}

impl Encoder {
    async fn next_chunk(&mut self) -> Option<Bytes> {
        match self.phase {
            Phase::Open => {
                self.phase = Phase::Items;
                Some(Bytes::from_static(b"["))
            }
            Phase::Items => {
                let next = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    next = self.stream.recv() => Some(next),
                };
                match next {
                    None => {
                        self.phase = Phase::Done;
                        debug!(
                            emitted = self.emitted,
                            "search response cancelled; array left open"
                        );
                        None
                    }
                    Some(Some(record)) => self.item(record),
                    Some(None) => self.close().await,
                }
            }
            Phase::Done => None,
        }
    }

    fn item(&mut self, record: Record) -> Option<Bytes> {
        let mut buf = Vec::with_capacity(128);
        if self.emitted > 0 {
            buf.push(b',');
        }
        if let Err(e) = serde_json::to_writer(&mut buf, &WireRecord::from(record)) {
            error!("failed to serialise search result: {}", e);
            self.phase = Phase::Done;
            return None;
        }
        self.emitted += 1;
        Some(Bytes::from(buf))
    }

    async fn close(&mut self) -> Option<Bytes> {
        self.phase = Phase::Done;
        let end = self.stream.finish().await;
        if end.is_complete() {
            info!(emitted = self.emitted, "search response complete");
            return Some(Bytes::from_static(b"]"));
        }
        if self.options.strict_truncation {
            warn!(emitted = self.emitted, ?end, "search truncated upstream; array left open");
            None
        } else {
            warn!(emitted = self.emitted, ?end, "search truncated upstream; closing array anyway");
            Some(Bytes::from_static(b"]"))
        }
    }
}
