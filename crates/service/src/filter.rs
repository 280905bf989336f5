use std::sync::atomic::{AtomicU64, Ordering};

use codec::{Classification, PacketClassifier, classify};

use crate::limiter::{Clock, RateLimiter, SystemClock};

/// Packets dropped by a [`ClassifierFilter`] so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterStats {
    /// Well formed packets of the other protocol.
    pub mismatched: u64,
    /// Packets that could not be classified at all.
    pub rejected: u64,
}

/// Input filter for a stream expecting one protocol.
///
/// Every dropped packet is counted, but at most one warning is written per
/// backoff interval so that a misbehaving peer cannot flood the log.
pub struct ClassifierFilter<C = SystemClock> {
    classifier: PacketClassifier,
    limiter: RateLimiter<C>,
    mismatched: AtomicU64,
    rejected: AtomicU64,
}

impl ClassifierFilter<SystemClock> {
    pub fn new(classifier: PacketClassifier) -> Self {
        Self::with_limiter(classifier, RateLimiter::default())
    }
}

impl<C: Clock> ClassifierFilter<C> {
    pub fn with_limiter(classifier: PacketClassifier, limiter: RateLimiter<C>) -> Self {
        Self {
            mismatched: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            classifier,
            limiter,
        }
    }

    pub fn classifier(&self) -> PacketClassifier {
        self.classifier
    }

    /// Returns whether the packet belongs on this stream.
    pub fn accept(&self, bytes: &[u8]) -> bool {
        let classification = classify(bytes);
        let counter = match (classification, self.classifier.wants_rtcp()) {
            (Classification::Rtcp, true) | (Classification::Rtp, false) => return true,
            (Classification::Rejected(_), _) => &self.rejected,
            _ => &self.mismatched,
        };

        counter.fetch_add(1, Ordering::Relaxed);

        if self.limiter.should_run() {
            let stats = self.stats();

            log::warn!(
                "dropping packet: expected={}, classified={classification:?}, size={}, mismatched={}, rejected={}",
                if self.classifier.wants_rtcp() { "rtcp" } else { "rtp" },
                bytes.len(),
                stats.mismatched,
                stats.rejected,
            );
        }

        false
    }

    pub fn stats(&self) -> FilterStats {
        FilterStats {
            mismatched: self.mismatched.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
