//! Ordered queue of pooled segments.
//!
//! Bytes accepted while the wrapped sink is busy are parked here and replayed
//! into the sink, in order, once it is free again. Each segment is a pooled
//! block whose length is its write cursor; only the last segment accepts new
//! bytes.
//!
//! Writable views are carved out of the tail with [`BytesMut::split_off`] and
//! re-joined with [`BytesMut::unsplit`], which is O(1) as long as the caller
//! stays within the reserved capacity.

use crate::buffer_pool::{BufferPool, PooledBuffer};
use crate::sink::BodySink;
use bytes::BytesMut;
use std::collections::VecDeque;
use std::sync::Arc;

/// What a [`BufferQueue::drain_into`] pass handed to the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Request/advance pairs issued
    pub segments: usize,
    /// Bytes copied into the sink
    pub bytes: usize,
}

impl ReplaySummary {
    pub fn is_empty(&self) -> bool {
        self.segments == 0
    }
}

/// Pooled segments holding bytes not yet handed to the sink.
pub struct BufferQueue {
    pool: Arc<BufferPool>,
    segments: VecDeque<PooledBuffer>,
    committed: usize,
}

impl BufferQueue {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            pool,
            segments: VecDeque::new(),
            committed: 0,
        }
    }

    /// Reserve a writable view with at least `size_hint` bytes of capacity.
    ///
    /// The view is the unused tail of the last segment when it is large
    /// enough; otherwise a new segment is rented. A zero hint asks for any
    /// non-empty space, which is a full pool block when the tail is exhausted.
    pub fn reserve(&mut self, size_hint: usize) -> BytesMut {
        let need = size_hint.max(1);
        if let Some(tail) = self.segments.back_mut() {
            if tail.spare_capacity() >= need {
                let at = tail.len();
                return tail.split_off(at);
            }
        }

        let mut block = self.pool.rent(size_hint);
        let view = block.split_off(0);
        self.segments.push_back(block);
        view
    }

    /// Commit a view obtained from [`reserve`](Self::reserve).
    ///
    /// If the segment it came from was replayed in the meantime, the view is
    /// adopted as a new unpooled segment so its bytes keep their position.
    pub fn commit(&mut self, view: BytesMut) {
        let written = view.len();
        match self.segments.back_mut() {
            Some(tail) => tail.unsplit(view),
            None => self.segments.push_back(PooledBuffer::detached(view)),
        }
        self.committed += written;
    }

    /// True when no committed bytes are waiting.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.committed == 0
    }

    /// Committed bytes waiting to be replayed.
    #[inline]
    pub fn len(&self) -> usize {
        self.committed
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Replay every segment into `sink` with one request/advance pair per
    /// non-empty segment, releasing segments as they go.
    pub fn drain_into<S: BodySink + ?Sized>(&mut self, sink: &mut S) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        while let Some(segment) = self.segments.pop_front() {
            if segment.is_empty() {
                continue;
            }
            let mut dst = sink.request_buffer(segment.len());
            dst.extend_from_slice(&segment);
            sink.advance(dst);

            summary.segments += 1;
            summary.bytes += segment.len();
        }
        self.committed = 0;
        summary
    }
}

impl std::fmt::Debug for BufferQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferQueue")
            .field("segments", &self.segments.len())
            .field("committed", &self.committed)
            .finish()
    }
}
