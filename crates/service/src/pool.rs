use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bytes::BytesMut;
use codec::Buffer;
use parking_lot::Mutex;

/// A receive buffer borrowed from a [`BufferPool`].
///
/// The buffer goes back to the pool only through [`BufferPool::recycle`],
/// dropping it simply frees the memory.
#[derive(Debug)]
pub struct PooledBuffer {
    bytes: BytesMut,
    closed: Arc<AtomicBool>,
}

impl PooledBuffer {
    /// Takes the memory out of the pool's bookkeeping for good.
    pub fn into_bytes(self) -> BytesMut {
        self.bytes
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsMut<[u8]> for PooledBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Buffer for PooledBuffer {
    fn is_invalid(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct Inner {
    idle: Mutex<Vec<BytesMut>>,
    closed: Arc<AtomicBool>,
    buffer_size: usize,
    capacity: usize,
}

/// Fixed-size buffers with an explicit acquire / recycle lifecycle.
///
/// At most `capacity` idle buffers are kept, recycling into a full pool
/// frees the buffer instead. Clones share the same pool.
#[derive(Clone)]
pub struct BufferPool(Arc<Inner>);

impl BufferPool {
    pub fn new(buffer_size: usize, capacity: usize) -> Self {
        Self(Arc::new(Inner {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            closed: Arc::new(AtomicBool::new(false)),
            buffer_size,
            capacity,
        }))
    }

    pub fn buffer_size(&self) -> usize {
        self.0.buffer_size
    }

    /// Number of buffers waiting to be reused.
    pub fn idle(&self) -> usize {
        self.0.idle.lock().len()
    }

    /// # Test
    ///
    /// ```
    /// use codec::PacketView;
    /// use rtp_transport_service::pool::BufferPool;
    ///
    /// let pool = BufferPool::new(1500, 4);
    /// let mut view = PacketView::full(pool.acquire());
    /// view.set_length(12).unwrap();
    ///
    /// pool.recycle(view.into_inner());
    /// assert_eq!(pool.idle(), 1);
    ///
    /// let view = PacketView::full(pool.acquire());
    /// assert_eq!(view.length(), 1500);
    /// assert_eq!(pool.idle(), 0);
    /// ```
    pub fn acquire(&self) -> PooledBuffer {
        let bytes = self
            .0
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::zeroed(self.0.buffer_size));

        PooledBuffer {
            closed: self.0.closed.clone(),
            bytes,
        }
    }

    /// Hands a buffer back. The caller must be done with every view of it,
    /// which ownership of the buffer guarantees.
    pub fn recycle(&self, buffer: PooledBuffer) {
        // Buffers of another pool, or of this pool after close, are dropped.
        if !Arc::ptr_eq(&buffer.closed, &self.0.closed) || self.0.closed.load(Ordering::Acquire) {
            return;
        }

        let mut bytes = buffer.bytes;
        if bytes.len() != self.0.buffer_size {
            bytes.resize(self.0.buffer_size, 0);
        }

        let mut idle = self.0.idle.lock();
        if idle.len() < self.0.capacity {
            idle.push(bytes);
        }
    }

    /// Frees the idle buffers and marks every outstanding one as invalid.
    pub fn close(&self) {
        self.0.closed.store(true, Ordering::Release);
        self.0.idle.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::PacketView;

    #[test]
    fn close_invalidates_outstanding_buffers() {
        let pool = BufferPool::new(64, 2);
        let view = PacketView::full(pool.acquire());

        assert!(!view.is_invalid());
        pool.close();
        assert!(view.is_invalid());

        pool.recycle(view.into_inner());
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn idle_buffers_are_bounded() {
        let pool = BufferPool::new(64, 2);
        let buffers = [pool.acquire(), pool.acquire(), pool.acquire()];

        for buffer in buffers {
            pool.recycle(buffer);
        }

        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn foreign_buffers_are_not_adopted() {
        let pool = BufferPool::new(64, 2);
        let other = BufferPool::new(32, 2);

        pool.recycle(other.acquire());
        assert_eq!(pool.idle(), 0);
    }
}
