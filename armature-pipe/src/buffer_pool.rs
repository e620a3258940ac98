//! Fixed-Block `BytesMut` Buffer Pool
//!
//! This module provides the pooled memory that backs queued response bytes.
//! A pool rents out fixed-size `BytesMut` blocks and takes them back when the
//! [`PooledBuffer`] guard is dropped, so a writer that queues under load does
//! not allocate on every write.
//!
//! ## Why Not Thread-Local?
//!
//! Queued segments are rented on the caller's task and released on the drain
//! task, which may run on another worker thread. The pool is therefore an
//! `Arc`-shared instance guarded by a `parking_lot` mutex; the critical section
//! is a single `Vec` push or pop.
//!
//! ## Leak Diagnostics
//!
//! Every rental is counted until its guard drops. [`BufferPool::outstanding`]
//! returning zero after a response completes means every block came back.
//!
//! ## Usage
//!
//! ```rust
//! use armature_pipe::buffer_pool::{BufferPool, PoolConfig};
//!
//! let pool = BufferPool::new(PoolConfig::default());
//! let mut block = pool.rent(0);
//! block.extend_from_slice(b"queued bytes");
//! assert_eq!(pool.outstanding(), 1);
//!
//! drop(block);
//! assert_eq!(pool.outstanding(), 0);
//! ```

use crate::error::{BodyError, Result};
use bytes::BytesMut;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::env;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

// ============================================================================
// Constants
// ============================================================================

/// Default block size (4KB), matching a typical slab block.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Default number of idle blocks kept for reuse.
pub const DEFAULT_MAX_RETAINED: usize = 64;

// ============================================================================
// Pool Configuration
// ============================================================================

/// Configuration for a [`BufferPool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Size of every pooled block; also the default reservation for a zero size hint
    pub block_size: usize,
    /// Maximum idle blocks retained for reuse
    pub max_retained: usize,
    /// Blocks allocated up front when the pool is created
    pub preallocate: usize,
    /// Collect hit/miss statistics (outstanding rentals are always tracked)
    pub collect_stats: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_retained: DEFAULT_MAX_RETAINED,
            preallocate: 0,
            collect_stats: true,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// High-performance configuration with larger blocks and a deeper pool
    pub fn high_performance() -> Self {
        Self {
            block_size: 16384,
            max_retained: 256,
            preallocate: 16,
            collect_stats: false,
        }
    }

    /// Memory-efficient configuration
    pub fn memory_efficient() -> Self {
        Self {
            block_size: 2048,
            max_retained: 16,
            preallocate: 0,
            collect_stats: true,
        }
    }

    /// Set the block size.
    pub fn block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    /// Set the number of idle blocks retained.
    pub fn max_retained(mut self, count: usize) -> Self {
        self.max_retained = count;
        self
    }

    /// Set the number of blocks allocated up front.
    pub fn preallocate(mut self, count: usize) -> Self {
        self.preallocate = count;
        self
    }

    /// Enable or disable statistics collection.
    pub fn collect_stats(mut self, enable: bool) -> Self {
        self.collect_stats = enable;
        self
    }

    /// Build a configuration from the environment, falling back to defaults.
    ///
    /// - `ARMATURE_POOL_BLOCK_SIZE` - block size in bytes
    /// - `ARMATURE_POOL_MAX_RETAINED` - idle blocks kept for reuse
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(size) = read_env_usize("ARMATURE_POOL_BLOCK_SIZE")? {
            config.block_size = size;
        }
        if let Some(count) = read_env_usize("ARMATURE_POOL_MAX_RETAINED")? {
            config.max_retained = count;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the pool cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(BodyError::Config("block_size must be non-zero".into()));
        }
        if self.preallocate > self.max_retained {
            return Err(BodyError::Config(format!(
                "preallocate ({}) exceeds max_retained ({})",
                self.preallocate, self.max_retained
            )));
        }
        Ok(())
    }
}

fn read_env_usize(key: &str) -> Result<Option<usize>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| BodyError::Config(format!("{key} must be an unsigned integer, got {raw:?}"))),
        Err(_) => Ok(None),
    }
}

// ============================================================================
// Pool Statistics
// ============================================================================

/// Statistics for a single pool instance
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Blocks served from the idle list
    hits: AtomicU64,
    /// Blocks allocated fresh
    misses: AtomicU64,
    /// Blocks returned to the idle list
    returns: AtomicU64,
    /// Blocks dropped instead of retained (pool full, resized or oversized)
    discards: AtomicU64,
    /// Total bytes allocated
    bytes_allocated: AtomicU64,
    /// Rentals not yet dropped
    outstanding: AtomicU64,
}

impl PoolStats {
    #[inline]
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_miss(&self, bytes: usize) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.bytes_allocated.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_return(&self) {
        self.returns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_discard(&self) {
        self.discards.fetch_add(1, Ordering::Relaxed);
    }

    /// Get hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get return count
    pub fn returns(&self) -> u64 {
        self.returns.load(Ordering::Relaxed)
    }

    /// Get discard count
    pub fn discards(&self) -> u64 {
        self.discards.load(Ordering::Relaxed)
    }

    /// Get total bytes allocated
    pub fn bytes_allocated(&self) -> u64 {
        self.bytes_allocated.load(Ordering::Relaxed)
    }

    /// Get the number of rentals not yet returned
    pub fn outstanding(&self) -> u64 {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Get hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            (hits / total) * 100.0
        } else {
            0.0
        }
    }
}

// ============================================================================
// Buffer Pool
// ============================================================================

/// A pool of fixed-size `BytesMut` blocks.
pub struct BufferPool {
    config: PoolConfig,
    idle: Mutex<Vec<BytesMut>>,
    stats: PoolStats,
}

impl BufferPool {
    /// Create a pool, allocating `config.preallocate` blocks up front.
    ///
    /// A zero block size is raised to one and preallocation is capped at
    /// `max_retained`. Use [`try_new`](Self::try_new) to reject such a
    /// configuration instead.
    pub fn new(config: PoolConfig) -> Arc<Self> {
        let block_size = config.block_size.max(1);
        let preallocate = config.preallocate.min(config.max_retained);
        let idle = (0..preallocate)
            .map(|_| BytesMut::with_capacity(block_size))
            .collect::<Vec<_>>();

        debug!(
            block_size,
            max_retained = config.max_retained,
            preallocated = idle.len(),
            "Buffer pool created"
        );

        Arc::new(Self {
            config: PoolConfig {
                block_size,
                preallocate,
                ..config
            },
            idle: Mutex::new(idle),
            stats: PoolStats::default(),
        })
    }

    /// Create a pool after checking `config` with [`PoolConfig::validate`].
    pub fn try_new(config: PoolConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Create a pool with the default configuration.
    pub fn with_defaults() -> Arc<Self> {
        Self::new(PoolConfig::default())
    }

    /// Rent a block with at least `min_size` bytes of capacity.
    ///
    /// Requests up to the block size are served from the idle list when
    /// possible. Larger requests get a dedicated allocation that is discarded
    /// on return.
    pub fn rent(self: &Arc<Self>, min_size: usize) -> PooledBuffer {
        let block_size = self.config.block_size;
        let buf = if min_size <= block_size {
            let reused = self.idle.lock().pop();
            match reused {
                Some(buf) => {
                    if self.config.collect_stats {
                        self.stats.record_hit();
                    }
                    buf
                }
                None => {
                    if self.config.collect_stats {
                        self.stats.record_miss(block_size);
                    }
                    BytesMut::with_capacity(block_size)
                }
            }
        } else {
            let capacity = min_size.next_power_of_two();
            if self.config.collect_stats {
                self.stats.record_miss(capacity);
            }
            BytesMut::with_capacity(capacity)
        };

        self.stats.outstanding.fetch_add(1, Ordering::AcqRel);
        PooledBuffer {
            inner: buf,
            pool: Some(Arc::clone(self)),
        }
    }

    fn release(&self, mut buf: BytesMut) {
        self.stats.outstanding.fetch_sub(1, Ordering::AcqRel);

        // Only exact blocks are kept; oversized rentals and split or regrown
        // blocks are dropped
        let reusable = buf.capacity() == self.config.block_size;
        let mut idle = self.idle.lock();
        if reusable && idle.len() < self.config.max_retained {
            buf.clear();
            idle.push(buf);
            drop(idle);
            if self.config.collect_stats {
                self.stats.record_return();
            }
        } else if self.config.collect_stats {
            self.stats.record_discard();
        }
    }

    /// Size of a pooled block.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// Number of idle blocks currently held.
    pub fn retained(&self) -> usize {
        self.idle.lock().len()
    }

    /// Number of rentals that have not been returned yet.
    #[inline]
    pub fn outstanding(&self) -> u64 {
        self.stats.outstanding()
    }

    /// Get pool statistics
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Get configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("block_size", &self.config.block_size)
            .field("retained", &self.retained())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

// ============================================================================
// Pooled Buffer (RAII Guard)
// ============================================================================

/// A block rented from a [`BufferPool`] that returns automatically when dropped.
///
/// A buffer built with [`PooledBuffer::detached`] has no pool behind it and is
/// simply freed on drop.
pub struct PooledBuffer {
    inner: BytesMut,
    pool: Option<Arc<BufferPool>>,
}

impl PooledBuffer {
    /// Wrap memory that did not come from a pool.
    pub fn detached(buf: BytesMut) -> Self {
        Self {
            inner: buf,
            pool: None,
        }
    }

    /// Whether this buffer will be handed back to a pool on drop.
    #[inline]
    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    /// Bytes of capacity not yet written.
    #[inline]
    pub fn spare_capacity(&self) -> usize {
        self.inner.capacity() - self.inner.len()
    }
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for PooledBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.inner));
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.inner.len())
            .field("capacity", &self.inner.capacity())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rent_uses_block_size() {
        let pool = BufferPool::new(PoolConfig::default().block_size(1024));
        let buf = pool.rent(0);
        assert_eq!(buf.capacity(), 1024);
        assert!(buf.is_empty());
        assert!(buf.is_pooled());
    }

    #[test]
    fn test_rent_and_reuse() {
        let pool = BufferPool::new(PoolConfig::default().block_size(256));

        let mut buf = pool.rent(10);
        buf.extend_from_slice(b"Hello, World!");
        drop(buf);
        assert_eq!(pool.retained(), 1);

        // Next rental should hit the idle list and come back cleared
        let buf = pool.rent(10);
        assert!(buf.is_empty());
        assert_eq!(pool.stats().hits(), 1);
        assert_eq!(pool.stats().misses(), 1);
    }

    #[test]
    fn test_oversized_rental_is_discarded() {
        let pool = BufferPool::new(PoolConfig::default().block_size(256));
        let buf = pool.rent(1000);
        assert_eq!(buf.capacity(), 1024);
        drop(buf);

        assert_eq!(pool.retained(), 0);
        assert_eq!(pool.stats().discards(), 1);
    }

    #[test]
    fn test_rental_just_over_block_size_is_discarded() {
        let pool = BufferPool::new(PoolConfig::default().block_size(256));
        let buf = pool.rent(257);
        assert_eq!(buf.capacity(), 512);
        drop(buf);

        assert_eq!(pool.retained(), 0);
        assert_eq!(pool.stats().discards(), 1);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_try_new_validates() {
        assert!(BufferPool::try_new(PoolConfig::default().block_size(0)).is_err());
        assert!(
            BufferPool::try_new(PoolConfig::default().max_retained(1).preallocate(2)).is_err()
        );

        let pool = BufferPool::new(PoolConfig::default().max_retained(1).preallocate(2));
        assert_eq!(pool.retained(), 1);
        assert!(BufferPool::try_new(PoolConfig::default()).is_ok());
    }

    #[test]
    fn test_split_block_is_discarded() {
        let pool = BufferPool::new(PoolConfig::default().block_size(256));
        let mut buf = pool.rent(0);
        buf.extend_from_slice(b"head");
        let at = buf.len();
        let _tail = buf.split_off(at);
        drop(buf);

        // The block lost its spare capacity to `_tail`, so it is not reusable
        assert_eq!(pool.retained(), 0);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_outstanding_tracks_rentals() {
        let pool = BufferPool::new(PoolConfig::default());
        let a = pool.rent(0);
        let b = pool.rent(0);
        assert_eq!(pool.outstanding(), 2);
        drop(a);
        assert_eq!(pool.outstanding(), 1);
        drop(b);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_max_retained() {
        let pool = BufferPool::new(PoolConfig::default().block_size(64).max_retained(1));
        let a = pool.rent(0);
        let b = pool.rent(0);
        drop(a);
        drop(b);
        assert_eq!(pool.retained(), 1);
        assert_eq!(pool.stats().returns(), 1);
        assert_eq!(pool.stats().discards(), 1);
    }

    #[test]
    fn test_preallocate() {
        let pool = BufferPool::new(PoolConfig::default().preallocate(4));
        assert_eq!(pool.retained(), 4);
        let _buf = pool.rent(0);
        assert_eq!(pool.stats().hits(), 1);
        assert!(pool.stats().hit_rate() > 99.0);
    }

    #[test]
    fn test_detached_buffer() {
        let buf = PooledBuffer::detached(BytesMut::from(&b"loose"[..]));
        assert!(!buf.is_pooled());
        assert_eq!(&buf[..], b"loose");
    }

    #[test]
    fn test_pool_config_presets() {
        let config = PoolConfig::high_performance();
        assert_eq!(config.max_retained, 256);
        assert!(!config.collect_stats);

        let config = PoolConfig::memory_efficient();
        assert_eq!(config.block_size, 2048);
        assert!(config.collect_stats);
    }

    #[test]
    fn test_pool_config_validate() {
        assert!(PoolConfig::default().validate().is_ok());
        assert!(PoolConfig::default().block_size(0).validate().is_err());
        assert!(
            PoolConfig::default()
                .max_retained(2)
                .preallocate(3)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_pool_config_serde() {
        let config: PoolConfig = serde_json::from_str(r#"{"block_size": 8192}"#).unwrap();
        assert_eq!(config.block_size, 8192);
        assert_eq!(config.max_retained, DEFAULT_MAX_RETAINED);

        let json = serde_json::to_string(&PoolConfig::memory_efficient()).unwrap();
        assert!(json.contains("\"block_size\":2048"));
    }
}
