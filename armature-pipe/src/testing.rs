//! Scriptable sink for tests and benchmarks.
//!
//! [`RecordingSink`] implements [`BodySink`] and records every call it
//! receives. Its paired [`SinkProbe`] inspects the recording and decides when
//! each inner flush resolves, which makes "the flush is still outstanding"
//! states easy to set up.
//!
//! # Examples
//!
//! ```rust,ignore
//! use armature_pipe::testing::{RecordingSink, SinkCall};
//! use armature_pipe::sink::FlushResult;
//!
//! let (sink, probe) = RecordingSink::new();
//! let writer = ConcurrentBodyWriter::new(sink, BufferPool::with_defaults());
//!
//! writer.write(b"hello")?;
//! let handle = writer.flush();
//!
//! probe.wait_for_flush_calls(1).await;
//! probe.complete_next_flush(FlushResult::flushed());
//! handle.await?;
//! ```

use crate::error::{BodyError, Result};
use crate::sink::{BodySink, FlushFuture, FlushResult};
use bytes::BytesMut;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Capacity handed out for a zero size hint.
pub const DEFAULT_SINK_BUFFER: usize = 4096;

/// A call observed by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    RequestBuffer(usize),
    Advance(usize),
    Flush,
    CancelPendingFlush,
    /// Carries the display form of the completion error, if any.
    Complete(Option<String>),
}

/// How a [`RecordingSink`] answers flushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Flushes stay pending until the probe resolves them.
    Manual,
    /// Flushes resolve immediately with a plain result.
    Immediate,
}

struct ProbeState {
    mode: FlushMode,
    calls: Vec<SinkCall>,
    written: Vec<u8>,
    pending: VecDeque<oneshot::Sender<Result<FlushResult>>>,
    completion: Option<Option<BodyError>>,
}

/// Sink that records its calls for later inspection.
pub struct RecordingSink {
    state: Arc<Mutex<ProbeState>>,
    flush_calls: watch::Sender<usize>,
}

/// Observer and flush controller for a [`RecordingSink`].
#[derive(Clone)]
pub struct SinkProbe {
    state: Arc<Mutex<ProbeState>>,
    flush_calls: watch::Receiver<usize>,
}

impl RecordingSink {
    /// A sink whose flushes wait for the probe.
    pub fn new() -> (Self, SinkProbe) {
        Self::with_mode(FlushMode::Manual)
    }

    /// A sink whose flushes complete immediately.
    pub fn immediate() -> (Self, SinkProbe) {
        Self::with_mode(FlushMode::Immediate)
    }

    pub fn with_mode(mode: FlushMode) -> (Self, SinkProbe) {
        let state = Arc::new(Mutex::new(ProbeState {
            mode,
            calls: Vec::new(),
            written: Vec::new(),
            pending: VecDeque::new(),
            completion: None,
        }));
        let (tx, rx) = watch::channel(0);
        (
            Self {
                state: Arc::clone(&state),
                flush_calls: tx,
            },
            SinkProbe {
                state,
                flush_calls: rx,
            },
        )
    }
}

impl BodySink for RecordingSink {
    fn request_buffer(&mut self, size_hint: usize) -> BytesMut {
        self.state.lock().calls.push(SinkCall::RequestBuffer(size_hint));
        let capacity = if size_hint == 0 {
            DEFAULT_SINK_BUFFER
        } else {
            size_hint
        };
        BytesMut::with_capacity(capacity)
    }

    fn advance(&mut self, buffer: BytesMut) {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::Advance(buffer.len()));
        state.written.extend_from_slice(&buffer);
    }

    fn flush(&mut self, _cancel: CancellationToken) -> FlushFuture {
        let fut = {
            let mut state = self.state.lock();
            state.calls.push(SinkCall::Flush);
            match state.mode {
                FlushMode::Immediate => futures_util::future::ready(Ok(FlushResult::flushed())).boxed(),
                FlushMode::Manual => {
                    let (tx, rx) = oneshot::channel();
                    state.pending.push_back(tx);
                    async move {
                        rx.await
                            .unwrap_or_else(|_| Err(BodyError::sink("flush abandoned by probe")))
                    }
                    .boxed()
                }
            }
        };
        self.flush_calls.send_modify(|count| *count += 1);
        fut
    }

    fn cancel_pending_flush(&mut self) {
        self.state.lock().calls.push(SinkCall::CancelPendingFlush);
    }

    fn complete(&mut self, error: Option<BodyError>) {
        let mut state = self.state.lock();
        state
            .calls
            .push(SinkCall::Complete(error.as_ref().map(ToString::to_string)));
        state.completion = Some(error);
    }
}

impl SinkProbe {
    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.state.lock().calls.clone()
    }

    /// Bytes advanced into the sink, in order.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    pub fn request_count(&self) -> usize {
        self.count(|call| matches!(call, SinkCall::RequestBuffer(_)))
    }

    pub fn advance_count(&self) -> usize {
        self.count(|call| matches!(call, SinkCall::Advance(_)))
    }

    pub fn flush_count(&self) -> usize {
        self.count(|call| matches!(call, SinkCall::Flush))
    }

    pub fn cancel_count(&self) -> usize {
        self.count(|call| matches!(call, SinkCall::CancelPendingFlush))
    }

    /// Request, advance and flush counts as one tuple.
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.request_count(), self.advance_count(), self.flush_count())
    }

    fn count(&self, pred: impl Fn(&SinkCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| pred(call)).count()
    }

    /// Flushes issued but not yet resolved.
    pub fn pending_flushes(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Resolve the oldest pending flush. Returns false if none was pending.
    pub fn complete_next_flush(&self, result: FlushResult) -> bool {
        self.resolve_next(Ok(result))
    }

    /// Fail the oldest pending flush. Returns false if none was pending.
    pub fn fail_next_flush(&self, error: BodyError) -> bool {
        self.resolve_next(Err(error))
    }

    fn resolve_next(&self, outcome: Result<FlushResult>) -> bool {
        let sender = self.state.lock().pending.pop_front();
        match sender {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn set_mode(&self, mode: FlushMode) {
        self.state.lock().mode = mode;
    }

    /// Whether `complete` has been called on the sink.
    pub fn is_completed(&self) -> bool {
        self.state.lock().completion.is_some()
    }

    /// The error passed to `complete`, if it was called with one.
    pub fn completion_error(&self) -> Option<BodyError> {
        self.state.lock().completion.clone().flatten()
    }

    /// Wait until the sink has seen at least `n` flush calls.
    pub async fn wait_for_flush_calls(&self, n: usize) {
        let mut rx = self.flush_calls.clone();
        // The sender lives in the sink; if it is gone no more calls can arrive
        let _ = rx.wait_for(|count| *count >= n).await;
    }
}

/// Sink that discards everything and completes every flush immediately.
///
/// Unlike [`RecordingSink`] it keeps no history, so it suits long benchmark
/// runs.
#[derive(Debug, Default)]
pub struct NullSink {
    bytes: u64,
    flushes: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn flushes(&self) -> u64 {
        self.flushes
    }
}

impl BodySink for NullSink {
    fn request_buffer(&mut self, size_hint: usize) -> BytesMut {
        BytesMut::with_capacity(if size_hint == 0 {
            DEFAULT_SINK_BUFFER
        } else {
            size_hint
        })
    }

    fn advance(&mut self, buffer: BytesMut) {
        self.bytes += buffer.len() as u64;
    }

    fn flush(&mut self, _cancel: CancellationToken) -> FlushFuture {
        self.flushes += 1;
        futures_util::future::ready(Ok(FlushResult::flushed())).boxed()
    }

    fn cancel_pending_flush(&mut self) {}

    fn complete(&mut self, _error: Option<BodyError>) {}
}

impl std::fmt::Debug for SinkProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SinkProbe")
            .field("mode", &state.mode)
            .field("calls", &state.calls.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}
