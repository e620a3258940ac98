//! Concurrency-Serializing Body Writer
//!
//! [`ConcurrentBodyWriter`] sits between response code that fires flushes
//! without awaiting them and a [`BodySink`] that only tolerates one logical
//! writer at a time.
//!
//! ## The Problem
//!
//! A sink must not hand out a new write buffer while a flush it started is
//! still outstanding. Response code that keeps producing data while a flush
//! drains would violate that:
//!
//! ```text
//! request_buffer / advance    → sink
//! flush (not awaited)         → sink, flush pending
//! request_buffer              → sink  ✗ contract violation
//! ```
//!
//! ## The Solution
//!
//! While an inner flush is outstanding, writes land in a pooled
//! [`BufferQueue`] and further flushes are coalesced. A drain loop running on
//! the tokio runtime waits for the inner flush, replays queued bytes in order
//! and issues the next flush until nothing is left:
//!
//! ```text
//! Idle ──flush──▶ FlushIssued ──done──▶ Draining ──replay+flush──▶ FlushIssued
//!                      │                   │
//!                      │ failed/canceled   └── queue empty ──▶ Idle
//!                      ▼
//!                 resolve all waiters
//! ```
//!
//! With no flush in flight and nothing queued, every call passes straight
//! through to the sink.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use armature_pipe::prelude::*;
//!
//! let writer = ConcurrentBodyWriter::new(sink, BufferPool::with_defaults());
//!
//! writer.write(b"HTTP body, part one")?;
//! let first = writer.flush();          // not awaited yet
//!
//! writer.write(b"part two")?;          // queued while the flush drains
//! let second = writer.flush();         // coalesced into the running loop
//!
//! first.await?;
//! second.await?;
//! let sink = writer.complete(None).await?;
//! ```

use crate::buffer_pool::BufferPool;
use crate::buffer_queue::{BufferQueue, ReplaySummary};
use crate::error::{BodyError, Result};
use crate::flush_coalescer::{FlushCoalescer, FlushHandle};
use crate::sink::{BodySink, FlushFuture, FlushResult};
use bytes::BytesMut;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const SINK_RELEASED: &str = "sink already released by complete";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a [`ConcurrentBodyWriter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Attached to every tracing event the writer emits
    pub label: String,
    /// Collect statistics
    pub collect_stats: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            label: "body".to_string(),
            collect_stats: true,
        }
    }
}

impl WriterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the label used in log events.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Enable or disable statistics collection.
    pub fn collect_stats(mut self, enable: bool) -> Self {
        self.collect_stats = enable;
        self
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters for one writer.
#[derive(Debug, Default)]
pub struct WriterStats {
    enabled: bool,
    /// Buffer requests forwarded to the sink
    requests_direct: AtomicU64,
    /// Buffer requests served by the queue
    requests_queued: AtomicU64,
    /// Bytes committed to the queue
    bytes_queued: AtomicU64,
    /// Segments replayed into the sink
    segments_replayed: AtomicU64,
    /// Bytes replayed into the sink
    bytes_replayed: AtomicU64,
    /// Flush calls made on the writer
    flush_requests: AtomicU64,
    /// Flush calls folded into a running drain loop
    flushes_coalesced: AtomicU64,
    /// Flushes issued to the sink
    inner_flushes: AtomicU64,
    /// Drain loops stopped by cancellation
    canceled: AtomicU64,
    /// Drain loops stopped by a sink failure
    failed: AtomicU64,
}

impl WriterStats {
    /// Create new stats. Nothing is recorded unless `enabled`.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    #[inline]
    fn bump(&self, counter: &AtomicU64, by: u64) {
        if self.enabled {
            counter.fetch_add(by, Ordering::Relaxed);
        }
    }

    #[inline]
    fn record_direct(&self) {
        self.bump(&self.requests_direct, 1);
    }

    #[inline]
    fn record_queued_request(&self) {
        self.bump(&self.requests_queued, 1);
    }

    #[inline]
    fn record_bytes_queued(&self, bytes: usize) {
        self.bump(&self.bytes_queued, bytes as u64);
    }

    #[inline]
    fn record_replay(&self, summary: ReplaySummary) {
        self.bump(&self.segments_replayed, summary.segments as u64);
        self.bump(&self.bytes_replayed, summary.bytes as u64);
    }

    #[inline]
    fn record_flush_request(&self) {
        self.bump(&self.flush_requests, 1);
    }

    #[inline]
    fn record_coalesced(&self) {
        self.bump(&self.flushes_coalesced, 1);
    }

    #[inline]
    fn record_inner_flush(&self) {
        self.bump(&self.inner_flushes, 1);
    }

    #[inline]
    fn record_canceled(&self) {
        self.bump(&self.canceled, 1);
    }

    #[inline]
    fn record_failed(&self) {
        self.bump(&self.failed, 1);
    }

    pub fn requests_direct(&self) -> u64 {
        self.requests_direct.load(Ordering::Relaxed)
    }

    pub fn requests_queued(&self) -> u64 {
        self.requests_queued.load(Ordering::Relaxed)
    }

    pub fn bytes_queued(&self) -> u64 {
        self.bytes_queued.load(Ordering::Relaxed)
    }

    pub fn segments_replayed(&self) -> u64 {
        self.segments_replayed.load(Ordering::Relaxed)
    }

    pub fn bytes_replayed(&self) -> u64 {
        self.bytes_replayed.load(Ordering::Relaxed)
    }

    pub fn flush_requests(&self) -> u64 {
        self.flush_requests.load(Ordering::Relaxed)
    }

    pub fn flushes_coalesced(&self) -> u64 {
        self.flushes_coalesced.load(Ordering::Relaxed)
    }

    pub fn inner_flushes(&self) -> u64 {
        self.inner_flushes.load(Ordering::Relaxed)
    }

    pub fn canceled(&self) -> u64 {
        self.canceled.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Share of buffer requests that had to be queued, as a percentage.
    pub fn queued_ratio(&self) -> f64 {
        let queued = self.requests_queued() as f64;
        let total = queued + self.requests_direct() as f64;
        if total > 0.0 {
            (queued / total) * 100.0
        } else {
            0.0
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// Lifecycle of a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// No inner flush outstanding
    Idle,
    /// The drain loop owns an inner flush
    InnerFlushInFlight,
    /// Like `InnerFlushInFlight`, with a cancellation forwarded to the sink
    /// since the current inner flush started
    CancelRequested,
    /// `complete` is waiting for the drain loop
    Completing,
    /// The sink has been completed
    Completed,
}

/// Where the outstanding buffer request was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferTarget {
    Inner,
    Queue,
}

struct PendingCompletion {
    error: Option<BodyError>,
    notify: oneshot::Sender<Result<()>>,
}

struct Shared<S> {
    sink: Option<S>,
    state: WriterState,
    last_target: Option<BufferTarget>,
    queue: BufferQueue,
    coalescer: FlushCoalescer,
    completion: Option<PendingCompletion>,
}

impl<S: BodySink> Shared<S> {
    fn sink_mut(&mut self) -> Result<&mut S> {
        self.sink.as_mut().ok_or(BodyError::Usage(SINK_RELEASED))
    }

    /// Replay queued bytes, then start the next inner flush.
    fn replay_and_flush(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(ReplaySummary, FlushFuture)> {
        let sink = self.sink.as_mut().ok_or(BodyError::Usage(SINK_RELEASED))?;
        let summary = self.queue.drain_into(&mut *sink);
        Ok((summary, sink.flush(cancel.clone())))
    }

    /// Replay what is left and complete the sink. No extra flush is issued.
    fn finish_completion(&mut self, error: Option<BodyError>) -> Result<ReplaySummary> {
        let sink = self.sink.as_mut().ok_or(BodyError::Usage(SINK_RELEASED))?;
        let summary = self.queue.drain_into(&mut *sink);
        sink.complete(error);
        self.state = WriterState::Completed;
        Ok(summary)
    }

    /// Stop the drain loop: settle a pending completion first, then resolve
    /// every coalesced flush.
    fn finish_loop(&mut self, outcome: Result<FlushResult>, stats: &WriterStats) {
        self.state = WriterState::Idle;
        if let Some(pending) = self.completion.take() {
            let settled = self
                .finish_completion(pending.error)
                .map(|summary| stats.record_replay(summary));
            let _ = pending.notify.send(settled);
        }
        self.coalescer.resolve(outcome);
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Serializes overlapping writers onto a single-owner [`BodySink`].
pub struct ConcurrentBodyWriter<S: BodySink> {
    shared: Arc<Mutex<Shared<S>>>,
    pool: Arc<BufferPool>,
    config: WriterConfig,
    stats: Arc<WriterStats>,
}

impl<S: BodySink> ConcurrentBodyWriter<S> {
    /// Wrap `sink`, queueing into blocks rented from `pool`.
    pub fn new(sink: S, pool: Arc<BufferPool>) -> Self {
        Self::with_config(sink, pool, WriterConfig::default())
    }

    pub fn with_config(sink: S, pool: Arc<BufferPool>, config: WriterConfig) -> Self {
        debug!(
            writer = %config.label,
            block_size = pool.block_size(),
            "Body writer created"
        );

        let shared = Shared {
            sink: Some(sink),
            state: WriterState::Idle,
            last_target: None,
            queue: BufferQueue::new(Arc::clone(&pool)),
            coalescer: FlushCoalescer::new(),
            completion: None,
        };

        Self {
            shared: Arc::new(Mutex::new(shared)),
            pool,
            stats: Arc::new(WriterStats::new(config.collect_stats)),
            config,
        }
    }

    /// Obtain a writable buffer with at least `size_hint` bytes of spare
    /// capacity (a default amount when zero).
    ///
    /// The buffer comes straight from the sink when it is idle and nothing is
    /// queued; otherwise it is carved from the queue. Never waits.
    pub fn request_buffer(&self, size_hint: usize) -> Result<BytesMut> {
        let mut shared = self.shared.lock();
        if shared.last_target.is_some() {
            return Err(BodyError::Usage(
                "request_buffer called while a buffer is outstanding",
            ));
        }

        if shared.state == WriterState::Idle && shared.queue.is_empty() {
            let buffer = shared.sink_mut()?.request_buffer(size_hint);
            shared.last_target = Some(BufferTarget::Inner);
            self.stats.record_direct();
            trace!(writer = %self.config.label, size_hint, "Buffer requested from sink");
            Ok(buffer)
        } else {
            let buffer = shared.queue.reserve(size_hint);
            shared.last_target = Some(BufferTarget::Queue);
            self.stats.record_queued_request();
            trace!(
                writer = %self.config.label,
                size_hint,
                state = ?shared.state,
                "Buffer reserved from queue"
            );
            Ok(buffer)
        }
    }

    /// Commit the bytes written into the buffer from the last
    /// [`request_buffer`](Self::request_buffer). Never waits.
    pub fn advance(&self, buffer: BytesMut) -> Result<()> {
        let mut shared = self.shared.lock();
        match shared.last_target.take() {
            None => Err(BodyError::Usage(
                "advance called without a matching request_buffer",
            )),
            Some(BufferTarget::Inner) => {
                shared.sink_mut()?.advance(buffer);
                Ok(())
            }
            Some(BufferTarget::Queue) => {
                let written = buffer.len();
                shared.queue.commit(buffer);
                self.stats.record_bytes_queued(written);
                Ok(())
            }
        }
    }

    /// Copy `data` through a request/advance pair.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut buffer = self.request_buffer(data.len())?;
        buffer.extend_from_slice(data);
        self.advance(buffer)
    }

    /// Flush everything written so far.
    ///
    /// The returned handle does not have to be awaited before writing again.
    pub fn flush(&self) -> FlushHandle {
        self.flush_with(CancellationToken::new())
    }

    /// Like [`flush`](Self::flush), passing `cancel` to the inner flush.
    ///
    /// A request coalesced into a running drain loop shares the token of the
    /// request that started the loop.
    pub fn flush_with(&self, cancel: CancellationToken) -> FlushHandle {
        let mut shared = self.shared.lock();
        self.stats.record_flush_request();

        if shared.last_target.is_some() {
            return FlushHandle::ready(Err(BodyError::Usage(
                "flush called while a buffer is outstanding",
            )));
        }

        if matches!(shared.state, WriterState::Completing | WriterState::Completed) {
            return FlushHandle::ready(Err(BodyError::Usage("flush called after complete")));
        }

        if shared.coalescer.is_draining() {
            self.stats.record_coalesced();
            trace!(
                writer = %self.config.label,
                waiting = shared.coalescer.waiting() + 1,
                "Flush coalesced into running drain loop"
            );
            return shared.coalescer.register();
        }

        // Check before touching the sink so a failure leaves it untouched
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => return FlushHandle::ready(Err(BodyError::NoRuntime)),
        };

        let (summary, mut inner) = match shared.replay_and_flush(&cancel) {
            Ok(started) => started,
            Err(err) => return FlushHandle::ready(Err(err)),
        };
        self.stats.record_replay(summary);
        self.stats.record_inner_flush();

        if let Some(outcome) = (&mut inner).now_or_never() {
            if let Err(err) = &outcome {
                warn!(writer = %self.config.label, error = %err, "Inner flush failed");
                self.stats.record_failed();
            }
            return FlushHandle::ready(outcome);
        }

        shared.state = WriterState::InnerFlushInFlight;
        shared.coalescer.begin();
        let handle = shared.coalescer.register();
        drop(shared);

        debug!(
            writer = %self.config.label,
            replayed = summary.bytes,
            "Inner flush pending, starting drain loop"
        );
        runtime.spawn(drain_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.stats),
            self.config.label.clone(),
            cancel,
            inner,
        ));
        handle
    }

    /// Forward a cancellation to the sink right away.
    ///
    /// If a drain loop is running and the sink answers the in-flight flush as
    /// canceled, the loop stops, every request coalesced into it resolves as
    /// canceled and queued bytes stay queued. A flush the sink completes
    /// normally keeps the loop going. Never waits.
    pub fn cancel_pending_flush(&self) {
        let mut shared = self.shared.lock();
        if let Some(sink) = shared.sink.as_mut() {
            sink.cancel_pending_flush();
        }
        if shared.state == WriterState::InnerFlushInFlight {
            shared.state = WriterState::CancelRequested;
            debug!(writer = %self.config.label, "Cancel requested for drain loop");
        }
    }

    /// Finish the body and hand the sink back.
    ///
    /// Waits for an in-flight inner flush, replays every queued byte without
    /// issuing another flush, then calls the sink's own `complete` with
    /// `error`. An unadvanced buffer is discarded.
    pub async fn complete(self, error: Option<BodyError>) -> Result<S> {
        let label = &self.config.label;

        let waiter = {
            let mut shared = self.shared.lock();
            if shared.last_target.take().is_some() {
                debug!(writer = %label, "Discarding unadvanced buffer");
            }

            match shared.state {
                WriterState::Idle => {
                    let summary = shared.finish_completion(error)?;
                    self.stats.record_replay(summary);
                    None
                }
                WriterState::InnerFlushInFlight | WriterState::CancelRequested => {
                    let (tx, rx) = oneshot::channel();
                    shared.completion = Some(PendingCompletion { error, notify: tx });
                    shared.state = WriterState::Completing;
                    Some(rx)
                }
                WriterState::Completing | WriterState::Completed => {
                    return Err(BodyError::Usage("complete called twice"));
                }
            }
        };

        if let Some(rx) = waiter {
            debug!(writer = %label, "Waiting for in-flight flush before completing");
            rx.await.map_err(|_| BodyError::DrainAborted)??;
        }

        let sink = self
            .shared
            .lock()
            .sink
            .take()
            .ok_or(BodyError::Usage(SINK_RELEASED))?;
        debug!(writer = %label, "Body writer completed");
        Ok(sink)
    }

    pub fn state(&self) -> WriterState {
        self.shared.lock().state
    }

    /// Committed bytes waiting in the queue.
    pub fn queued_bytes(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// True between a `request_buffer` and its `advance`.
    pub fn has_pending_buffer(&self) -> bool {
        self.shared.lock().last_target.is_some()
    }

    /// True while a drain loop owns an inner flush.
    pub fn is_draining(&self) -> bool {
        self.shared.lock().coalescer.is_draining()
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }
}

impl<S: BodySink> std::fmt::Debug for ConcurrentBodyWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("ConcurrentBodyWriter")
            .field("label", &self.config.label)
            .field("state", &shared.state)
            .field("queue", &shared.queue)
            .field("waiting", &shared.coalescer.waiting())
            .finish()
    }
}

// ============================================================================
// Drain Loop
// ============================================================================

async fn drain_loop<S: BodySink>(
    shared: Arc<Mutex<Shared<S>>>,
    stats: Arc<WriterStats>,
    label: String,
    cancel: CancellationToken,
    mut inner: FlushFuture,
) {
    let mut rounds = 1usize;
    loop {
        let outcome = inner.await;
        let mut guard = shared.lock();

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                warn!(writer = %label, error = %err, rounds, "Inner flush failed, stopping drain loop");
                stats.record_failed();
                guard.finish_loop(Err(err), &stats);
                return;
            }
        };

        if result.is_canceled {
            debug!(writer = %label, queued = guard.queue.len(), "Drain loop canceled");
            stats.record_canceled();
            guard.finish_loop(Ok(result), &stats);
            return;
        }

        // A cancel that the sink did not act on is spent with this flush
        if guard.state == WriterState::CancelRequested {
            guard.state = WriterState::InnerFlushInFlight;
        }

        if guard.state == WriterState::Completing || guard.queue.is_empty() {
            debug!(writer = %label, rounds, "Drain loop finished");
            guard.finish_loop(Ok(result), &stats);
            return;
        }

        match guard.replay_and_flush(&cancel) {
            Ok((summary, next)) => {
                stats.record_replay(summary);
                stats.record_inner_flush();
                trace!(writer = %label, replayed = summary.bytes, "Queue replayed, flushing again");
                inner = next;
                rounds += 1;
            }
            Err(err) => {
                guard.finish_loop(Err(err), &stats);
                return;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::PoolConfig;
    use crate::testing::{RecordingSink, SinkCall, SinkProbe};
    use tokio_test::{assert_pending, assert_ready};

    fn manual_writer() -> (ConcurrentBodyWriter<RecordingSink>, SinkProbe) {
        let (sink, probe) = RecordingSink::new();
        let writer = ConcurrentBodyWriter::new(sink, BufferPool::with_defaults());
        (writer, probe)
    }

    #[tokio::test]
    async fn test_fast_path_passthrough() {
        let (sink, probe) = RecordingSink::immediate();
        let writer = ConcurrentBodyWriter::new(sink, BufferPool::with_defaults());

        writer.write(b"hello").unwrap();
        let handle = writer.flush();
        assert!(handle.is_immediate());
        assert_eq!(handle.await.unwrap(), FlushResult::flushed());

        assert_eq!(probe.counts(), (1, 1, 1));
        assert_eq!(writer.state(), WriterState::Idle);
        assert_eq!(writer.stats().requests_direct(), 1);
        assert_eq!(writer.stats().requests_queued(), 0);
    }

    #[tokio::test]
    async fn test_usage_errors() {
        let (writer, probe) = manual_writer();

        assert!(writer.advance(BytesMut::new()).unwrap_err().is_usage());

        let buffer = writer.request_buffer(8).unwrap();
        assert!(writer.has_pending_buffer());
        assert!(writer.request_buffer(8).unwrap_err().is_usage());
        assert!(writer.flush().await.unwrap_err().is_usage());

        writer.advance(buffer).unwrap();
        assert!(!writer.has_pending_buffer());

        // Only the first request reached the sink
        assert_eq!(probe.counts(), (1, 1, 0));
    }

    #[test]
    fn test_flush_without_runtime() {
        let (writer, probe) = manual_writer();
        writer.write(b"data").unwrap();

        let outcome = writer.flush().now_or_never().unwrap();
        assert!(matches!(outcome, Err(BodyError::NoRuntime)));
        assert_eq!(probe.flush_count(), 0);
        assert_eq!(writer.state(), WriterState::Idle);
    }

    #[tokio::test]
    async fn test_writes_queue_while_flush_in_flight() {
        let (writer, probe) = manual_writer();

        writer.write(b"first").unwrap();
        let mut first = writer.flush();
        assert_pending!(futures_util::poll!(&mut first));
        assert_eq!(writer.state(), WriterState::InnerFlushInFlight);
        assert!(writer.is_draining());

        writer.write(b"second").unwrap();
        let mut second = writer.flush();
        assert_eq!(writer.queued_bytes(), 6);
        assert_eq!(probe.counts(), (1, 1, 1));
        assert_eq!(writer.stats().flushes_coalesced(), 1);

        probe.complete_next_flush(FlushResult::flushed());
        probe.wait_for_flush_calls(2).await;
        assert_pending!(futures_util::poll!(&mut first));
        assert_eq!(probe.counts(), (2, 2, 2));

        probe.complete_next_flush(FlushResult::flushed());
        assert_eq!(first.await.unwrap(), FlushResult::flushed());
        let second = assert_ready!(futures_util::poll!(&mut second));
        assert_eq!(second.unwrap(), FlushResult::flushed());

        assert_eq!(probe.written(), b"firstsecond".to_vec());
        assert_eq!(writer.state(), WriterState::Idle);
        assert!(!writer.is_draining());
        assert_eq!(writer.stats().bytes_replayed(), 6);
    }

    #[tokio::test]
    async fn test_inner_failure_resolves_every_waiter() {
        let (writer, probe) = manual_writer();

        writer.write(b"a").unwrap();
        let first = writer.flush();
        writer.write(b"b").unwrap();
        let second = writer.flush();

        probe.fail_next_flush(BodyError::sink("reset by peer"));
        assert_eq!(first.await.unwrap_err().to_string(), "Sink error: reset by peer");
        assert_eq!(second.await.unwrap_err().to_string(), "Sink error: reset by peer");

        // The loop halted without replaying the queued byte
        assert_eq!(probe.counts(), (1, 1, 1));
        assert_eq!(writer.queued_bytes(), 1);
        assert_eq!(writer.stats().failed(), 1);
    }

    #[tokio::test]
    async fn test_complete_when_idle() {
        let (writer, probe) = manual_writer();
        writer.write(b"tail").unwrap();

        let sink = writer.complete(None).await.unwrap();
        drop(sink);

        assert!(probe.is_completed());
        assert_eq!(
            probe.calls(),
            vec![
                SinkCall::RequestBuffer(4),
                SinkCall::Advance(4),
                SinkCall::Complete(None),
            ]
        );
    }

    #[tokio::test]
    async fn test_complete_discards_unadvanced_buffer() {
        let pool = BufferPool::new(PoolConfig::default());
        let (sink, probe) = RecordingSink::new();
        let writer = ConcurrentBodyWriter::new(sink, Arc::clone(&pool));

        writer.write(b"x").unwrap();
        let _pending = writer.flush();
        let mut orphan = writer.request_buffer(0).unwrap();
        orphan.extend_from_slice(b"never committed");

        let completing = tokio::spawn(writer.complete(None));
        probe.complete_next_flush(FlushResult::flushed());
        completing.await.unwrap().unwrap();
        drop(orphan);

        assert_eq!(probe.written(), b"x".to_vec());
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_writer_config() {
        let config = WriterConfig::new().label("resp-42").collect_stats(false);
        assert_eq!(config.label, "resp-42");
        assert!(!config.collect_stats);

        let stats = WriterStats::new(false);
        stats.record_direct();
        assert_eq!(stats.requests_direct(), 0);
        assert_eq!(stats.queued_ratio(), 0.0);
    }

    #[test]
    fn test_queued_ratio() {
        let stats = WriterStats::new(true);
        stats.record_direct();
        stats.record_queued_request();
        assert!((stats.queued_ratio() - 50.0).abs() < f64::EPSILON);
    }
}
