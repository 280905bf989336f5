use std::sync::Arc;

use anyhow::Result;
use codec::{FeedbackMessage, FeedbackType};
use parking_lot::RwLock;

/// What a listener gets to see of a decoded feedback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackEvent {
    /// The media source the feedback is about.
    pub source: u32,
    pub fmt: u8,
    pub payload_type: FeedbackType,
}

impl From<&FeedbackMessage> for FeedbackEvent {
    fn from(message: &FeedbackMessage) -> Self {
        Self {
            source: message.source_ssrc(),
            fmt: message.fmt(),
            payload_type: message.payload_type(),
        }
    }
}

pub trait FeedbackListener: Send + Sync {
    fn on_feedback(&self, event: &FeedbackEvent) -> Result<()>;
}

impl<F> FeedbackListener for F
where
    F: Fn(&FeedbackEvent) -> Result<()> + Send + Sync,
{
    fn on_feedback(&self, event: &FeedbackEvent) -> Result<()> {
        self(event)
    }
}

/// Decodes RTCP feedback and hands it to every registered listener.
///
/// Listeners are identified by their allocation, registering the same `Arc`
/// twice has no effect. Cloning the dispatcher shares the registry.
#[derive(Default, Clone)]
pub struct FeedbackDispatcher {
    listeners: Arc<RwLock<Vec<Arc<dyn FeedbackListener>>>>,
}

impl FeedbackDispatcher {
    /// Returns false if the listener was already registered.
    pub fn add(&self, listener: Arc<dyn FeedbackListener>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|it| same(it, &listener)) {
            return false;
        }

        listeners.push(listener);
        true
    }

    /// Returns false if the listener was not registered.
    pub fn remove(&self, listener: &Arc<dyn FeedbackListener>) -> bool {
        let mut listeners = self.listeners.write();
        let size = listeners.len();
        listeners.retain(|it| !same(it, listener));
        listeners.len() != size
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Decodes `bytes` and notifies the listeners in registration order.
    ///
    /// Nothing is decoded while no listener is registered. The first listener
    /// error stops the dispatch and is returned as is, listeners are not
    /// isolated from each other.
    ///
    /// # Test
    ///
    /// ```
    /// use std::sync::{Arc, atomic::{AtomicU32, Ordering}};
    /// use codec::FeedbackMessage;
    /// use rtp_transport_service::dispatcher::{FeedbackDispatcher, FeedbackEvent, FeedbackListener};
    ///
    /// let dispatcher = FeedbackDispatcher::default();
    /// let bytes = FeedbackMessage::fir(1, 0xbeef, 0).to_bytes();
    ///
    /// // no listener, no decoding
    /// assert_eq!(dispatcher.dispatch(&bytes).unwrap(), None);
    ///
    /// let seen = Arc::new(AtomicU32::new(0));
    /// let listener: Arc<dyn FeedbackListener> = {
    ///     let seen = seen.clone();
    ///     Arc::new(move |event: &FeedbackEvent| {
    ///         seen.store(event.source, Ordering::Relaxed);
    ///         Ok::<_, anyhow::Error>(())
    ///     })
    /// };
    ///
    /// dispatcher.add(listener);
    ///
    /// assert!(dispatcher.dispatch(&bytes).unwrap().is_some());
    /// assert_eq!(seen.load(Ordering::Relaxed), 0xbeef);
    /// ```
    pub fn dispatch(&self, bytes: &[u8]) -> Result<Option<FeedbackMessage>> {
        // Snapshot so that listeners may (un)register while being called.
        let listeners = {
            let listeners = self.listeners.read();
            if listeners.is_empty() {
                return Ok(None);
            }

            listeners.clone()
        };

        let Some(message) = FeedbackMessage::decode(bytes) else {
            return Ok(None);
        };

        let event = FeedbackEvent::from(&message);
        for listener in listeners {
            listener.on_feedback(&event)?;
        }

        Ok(Some(message))
    }
}

fn same(a: &Arc<dyn FeedbackListener>, b: &Arc<dyn FeedbackListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
