// Response body write pipeline for the Armature HTTP framework
// Serializes overlapping writers onto a single-owner body sink, queueing
// into pooled buffers while the sink is busy flushing.

pub mod buffer_pool;
pub mod buffer_queue;
pub mod concurrent_writer;
pub mod error;
pub mod flush_coalescer;
pub mod logging;
pub mod sink;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use buffer_pool::{BufferPool, PoolConfig, PoolStats, PooledBuffer};
pub use buffer_queue::{BufferQueue, ReplaySummary};
pub use concurrent_writer::*;
pub use error::*;
pub use flush_coalescer::{FlushCoalescer, FlushHandle};
pub use sink::*;

pub mod prelude {
    pub use crate::{
        BodyError, BodySink, BufferPool, ConcurrentBodyWriter, FlushFuture, FlushHandle,
        FlushResult, PoolConfig, Result, WriterConfig, WriterState,
    };
    pub use bytes::BytesMut;
    pub use tokio_util::sync::CancellationToken;
}
