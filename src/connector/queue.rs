use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, Ordering},
};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Bounded packet queue between producers and a single writer task.
///
/// Pushing never waits: when the queue is full the oldest packet is
/// dropped to make room, and the caller learns how many were dropped.
pub struct SendQueue {
    items: Mutex<VecDeque<Bytes>>,
    notify: Notify,
    closed: AtomicBool,
    capacity: usize,
}

impl SendQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    /// # Test
    ///
    /// ```
    /// use bytes::Bytes;
    /// use rtp_transport::connector::queue::SendQueue;
    ///
    /// let queue = SendQueue::new(2);
    ///
    /// assert_eq!(queue.push(Bytes::from_static(b"1")), 0);
    /// assert_eq!(queue.push(Bytes::from_static(b"2")), 0);
    /// assert_eq!(queue.push(Bytes::from_static(b"3")), 1);
    /// assert_eq!(queue.len(), 2);
    /// ```
    pub fn push(&self, bytes: Bytes) -> usize {
        let mut dropped = 0;

        {
            let mut items = self.items.lock();
            while items.len() >= self.capacity {
                items.pop_front();
                dropped += 1;
            }

            items.push_back(bytes);
        }

        self.notify.notify_one();
        dropped
    }

    /// Waits for the next packet, `None` once the queue is closed.
    pub async fn pop(&self) -> Option<Bytes> {
        loop {
            if self.is_closed() {
                return None;
            }

            let item = self.items.lock().pop_front();
            if item.is_some() {
                return item;
            }

            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Discards the pending packets and wakes the writer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.items.lock().clear();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_the_newest_packets() {
        let queue = SendQueue::new(3);

        let dropped: usize = (0u8..10)
            .map(|it| queue.push(Bytes::copy_from_slice(&[it])))
            .sum();

        assert_eq!(dropped, 7);
        assert_eq!(queue.pop().await.as_deref(), Some(&[7u8][..]));
        assert_eq!(queue.pop().await.as_deref(), Some(&[8u8][..]));
        assert_eq!(queue.pop().await.as_deref(), Some(&[9u8][..]));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn close_wakes_the_writer() {
        let queue = std::sync::Arc::new(SendQueue::new(4));

        let writer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::task::yield_now().await;
        queue.close();

        assert_eq!(writer.await.ok().flatten(), None);
    }
}
