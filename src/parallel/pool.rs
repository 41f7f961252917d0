//! Chunk buffer recycling
//!
//! The reader acquires one buffer per chunk and wraps it in a [`BufferHandle`].
//! Every batch carved from that chunk holds a clone of the handle; the buffer goes
//! back to the pool when the last clone is dropped.

use crossbeam_queue::ArrayQueue;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters describing pool behaviour over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers freshly allocated because the pool had nothing large enough.
    pub allocated: u64,
    /// Buffers served from the free list.
    pub reused: u64,
    /// Handles whose buffer came back (pooled or dropped).
    pub released: u64,
    /// Handles created but not yet released.
    pub outstanding: u64,
}

#[derive(Debug)]
pub struct BufferPool {
    free: ArrayQueue<Vec<u8>>,
    slab_capacity: usize,
    allocated: AtomicU64,
    reused: AtomicU64,
    handles: AtomicU64,
    released: AtomicU64,
}

impl BufferPool {
    /// `slots` bounds how many idle buffers are retained; buffers larger than
    /// `slab_capacity` are never retained.
    pub fn new(slots: usize, slab_capacity: usize) -> Self {
        Self {
            free: ArrayQueue::new(slots.max(1)),
            slab_capacity,
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            handles: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    pub fn slab_capacity(&self) -> usize {
        self.slab_capacity
    }

    /// Returns an empty buffer with at least `min_capacity` bytes of capacity.
    pub fn acquire(&self, min_capacity: usize) -> Vec<u8> {
        if let Some(mut buf) = self.free.pop() {
            if buf.capacity() >= min_capacity {
                buf.clear();
                self.reused.fetch_add(1, Ordering::Relaxed);
                return buf;
            }
            // Too small for this request; keep it for the next ordinary chunk.
            let _ = self.free.push(buf);
        }

        self.allocated.fetch_add(1, Ordering::Relaxed);
        if min_capacity <= self.slab_capacity {
            Vec::with_capacity(self.slab_capacity)
        } else {
            Vec::with_capacity(min_capacity)
        }
    }

    /// Hands a buffer back. Oversized buffers and overflow beyond the slot limit
    /// are dropped instead of pooled.
    pub fn release(&self, mut buf: Vec<u8>) {
        if buf.capacity() > self.slab_capacity {
            return;
        }
        buf.clear();
        let _ = self.free.push(buf);
    }

    pub fn idle(&self) -> usize {
        self.free.len()
    }

    pub fn stats(&self) -> PoolStats {
        let handles = self.handles.load(Ordering::SeqCst);
        let released = self.released.load(Ordering::SeqCst);
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            released,
            outstanding: handles.saturating_sub(released),
        }
    }
}

struct SharedBuffer {
    data: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        self.pool.released.fetch_add(1, Ordering::SeqCst);
        self.pool.release(std::mem::take(&mut self.data));
    }
}

/// Reference-counted, read-only view of a pooled chunk buffer.
///
/// Cloning bumps the count; the buffer returns to its pool exactly once, when the
/// final clone drops.
#[derive(Clone)]
pub struct BufferHandle {
    inner: Arc<SharedBuffer>,
}

impl BufferHandle {
    pub fn new(data: Vec<u8>, pool: Arc<BufferPool>) -> Self {
        pool.handles.fetch_add(1, Ordering::SeqCst);
        Self {
            inner: Arc::new(SharedBuffer { data, pool }),
        }
    }

    /// Number of live clones (batches or results) still viewing this buffer.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl Deref for BufferHandle {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.inner.data
    }
}

impl std::fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferHandle")
            .field("len", &self.inner.data.len())
            .field("refs", &self.ref_count())
            .finish()
    }
}
