//! Sink contract for response body writers.
//!
//! A [`BodySink`] is the single-owner output a [`ConcurrentBodyWriter`] wraps:
//! typically the transport-facing pipe of one response. Its contract is
//! strict: a new [`request_buffer`](BodySink::request_buffer) must not be
//! issued while a flush it started is still outstanding. The writer upholds
//! that contract on behalf of overlapping callers.
//!
//! "Advance by `n`" is expressed by handing back the buffer obtained from
//! `request_buffer` with `n` bytes written into it.
//!
//! [`ConcurrentBodyWriter`]: crate::concurrent_writer::ConcurrentBodyWriter

use crate::error::{BodyError, Result};
use bytes::BytesMut;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Future returned by [`BodySink::flush`].
///
/// It is `'static` so the writer can await it without holding its lock.
pub type FlushFuture = BoxFuture<'static, Result<FlushResult>>;

/// Outcome of a flush that did not fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushResult {
    /// The flush was interrupted by a cancellation.
    pub is_canceled: bool,
    /// The reader on the other side has stopped consuming.
    pub is_completed: bool,
}

impl FlushResult {
    pub const fn new(is_canceled: bool, is_completed: bool) -> Self {
        Self {
            is_canceled,
            is_completed,
        }
    }

    /// A flush that drained normally.
    pub const fn flushed() -> Self {
        Self::new(false, false)
    }

    /// A flush interrupted by cancellation.
    pub const fn canceled() -> Self {
        Self::new(true, false)
    }

    /// A flush after which the reader has gone away.
    pub const fn completed() -> Self {
        Self::new(false, true)
    }
}

/// The output a body writer serializes access to.
///
/// All methods except the returned flush future are synchronous; the writer
/// calls them while holding its internal lock.
pub trait BodySink: Send + 'static {
    /// Obtain an empty writable buffer with at least `size_hint` bytes of
    /// spare capacity. A `size_hint` of zero asks for the sink's default.
    fn request_buffer(&mut self, size_hint: usize) -> BytesMut;

    /// Commit the bytes written into a buffer obtained from `request_buffer`.
    fn advance(&mut self, buffer: BytesMut);

    /// Start pushing committed bytes downstream.
    fn flush(&mut self, cancel: CancellationToken) -> FlushFuture;

    /// Ask an in-flight flush to finish early with a canceled result.
    fn cancel_pending_flush(&mut self);

    /// Terminal step; the sink flushes whatever it still holds.
    fn complete(&mut self, error: Option<BodyError>);
}

impl<S: BodySink + ?Sized> BodySink for Box<S> {
    fn request_buffer(&mut self, size_hint: usize) -> BytesMut {
        (**self).request_buffer(size_hint)
    }

    fn advance(&mut self, buffer: BytesMut) {
        (**self).advance(buffer)
    }

    fn flush(&mut self, cancel: CancellationToken) -> FlushFuture {
        (**self).flush(cancel)
    }

    fn cancel_pending_flush(&mut self) {
        (**self).cancel_pending_flush()
    }

    fn complete(&mut self, error: Option<BodyError>) {
        (**self).complete(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    struct VecSink {
        data: Vec<u8>,
        completed: bool,
    }

    impl BodySink for VecSink {
        fn request_buffer(&mut self, size_hint: usize) -> BytesMut {
            BytesMut::with_capacity(size_hint.max(64))
        }

        fn advance(&mut self, buffer: BytesMut) {
            self.data.extend_from_slice(&buffer);
        }

        fn flush(&mut self, _cancel: CancellationToken) -> FlushFuture {
            futures_util::future::ready(Ok(FlushResult::flushed())).boxed()
        }

        fn cancel_pending_flush(&mut self) {}

        fn complete(&mut self, _error: Option<BodyError>) {
            self.completed = true;
        }
    }

    #[test]
    fn test_flush_result_constructors() {
        assert_eq!(FlushResult::default(), FlushResult::flushed());
        assert!(FlushResult::canceled().is_canceled);
        assert!(!FlushResult::canceled().is_completed);
        assert!(FlushResult::completed().is_completed);
    }

    #[test]
    fn test_boxed_sink_forwards() {
        let mut sink: Box<dyn BodySink> = Box::new(VecSink {
            data: Vec::new(),
            completed: false,
        });

        let mut buf = sink.request_buffer(0);
        assert!(buf.capacity() >= 64);
        buf.extend_from_slice(b"abc");
        sink.advance(buf);

        let result = sink.flush(CancellationToken::new()).now_or_never();
        assert!(matches!(result, Some(Ok(r)) if r == FlushResult::flushed()));
        sink.complete(None);
    }
}
