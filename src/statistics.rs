use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

/// The kind of event a connector reports into its statistics.
#[derive(Debug, Clone, Copy)]
pub enum Stats {
    ReceivedBytes(usize),
    SendBytes(usize),
    ReceivedPkts(usize),
    SendPkts(usize),
    /// Dropped by the input filter.
    RejectedPkts(usize),
    /// Dropped from a full send queue.
    DroppedPkts(usize),
    /// Datagrams larger than the receive buffer, dropped.
    TruncatedPkts(usize),
}

pub trait Number {
    fn add(&self, value: usize);
    fn get(&self) -> usize;
}

#[derive(Default)]
pub struct Count(AtomicUsize);

impl Number for Count {
    fn add(&self, value: usize) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per connector counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Counts<T> {
    pub received_bytes: T,
    pub send_bytes: T,
    pub received_pkts: T,
    pub send_pkts: T,
    pub rejected_pkts: T,
    pub dropped_pkts: T,
    pub truncated_pkts: T,
}

impl<T: Number> Counts<T> {
    /// # Example
    ///
    /// ```
    /// use rtp_transport::statistics::*;
    ///
    /// let counts = Counts::<Count>::default();
    ///
    /// counts.add(&Stats::ReceivedBytes(1));
    /// assert_eq!(counts.received_bytes.get(), 1);
    ///
    /// counts.add(&Stats::ReceivedPkts(1));
    /// assert_eq!(counts.received_pkts.get(), 1);
    ///
    /// counts.add(&Stats::DroppedPkts(2));
    /// assert_eq!(counts.dropped_pkts.get(), 2);
    /// ```
    pub fn add(&self, payload: &Stats) {
        match payload {
            Stats::ReceivedBytes(v) => self.received_bytes.add(*v),
            Stats::ReceivedPkts(v) => self.received_pkts.add(*v),
            Stats::SendBytes(v) => self.send_bytes.add(*v),
            Stats::SendPkts(v) => self.send_pkts.add(*v),
            Stats::RejectedPkts(v) => self.rejected_pkts.add(*v),
            Stats::DroppedPkts(v) => self.dropped_pkts.add(*v),
            Stats::TruncatedPkts(v) => self.truncated_pkts.add(*v),
        }
    }
}

/// Shared handle on one connector's counters.
#[derive(Clone, Default)]
pub struct Statistics(Arc<Counts<Count>>);

impl Statistics {
    pub fn report(&self, reports: &[Stats]) {
        for item in reports {
            self.0.add(item);
        }
    }

    /// # Example
    ///
    /// ```
    /// use rtp_transport::statistics::*;
    ///
    /// let statistics = Statistics::default();
    /// statistics.report(&[Stats::SendBytes(100), Stats::SendPkts(1)]);
    ///
    /// let counts = statistics.get();
    /// assert_eq!(counts.send_bytes, 100);
    /// assert_eq!(counts.send_pkts, 1);
    /// assert_eq!(counts.received_pkts, 0);
    /// ```
    pub fn get(&self) -> Counts<usize> {
        Counts {
            received_bytes: self.0.received_bytes.get(),
            received_pkts: self.0.received_pkts.get(),
            send_bytes: self.0.send_bytes.get(),
            send_pkts: self.0.send_pkts.get(),
            rejected_pkts: self.0.rejected_pkts.get(),
            dropped_pkts: self.0.dropped_pkts.get(),
            truncated_pkts: self.0.truncated_pkts.get(),
        }
    }
}
