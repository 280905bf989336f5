use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

/// Default spacing between two permitted runs of a rate-limited action.
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_secs(10);

/// Millisecond tick source. The value is allowed to wrap around at 2^32.
pub trait Clock: Send + Sync {
    fn now(&self) -> u32;
}

/// Milliseconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock(Instant);

impl Default for SystemClock {
    fn default() -> Self {
        Self(Instant::now())
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u32 {
        // Truncation is the wraparound.
        self.0.elapsed().as_millis() as u32
    }
}

/// A clock that only moves when told to, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU32>);

impl ManualClock {
    pub fn new(now: u32) -> Self {
        Self(Arc::new(AtomicU32::new(now)))
    }

    pub fn set(&self, now: u32) {
        self.0.store(now, Ordering::Relaxed);
    }

    pub fn advance(&self, millis: u32) {
        self.0.fetch_add(millis, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Time gate for a single repeated action, typically an error report.
///
/// Exactly one call to [`RateLimiter::should_run`] is permitted per backoff
/// interval, there is no burst capacity and nothing is queued. Elapsed time
/// is computed with wrapping 32-bit subtraction, so a wrapping clock never
/// suppresses the action forever.
pub struct RateLimiter<C = SystemClock> {
    clock: C,
    min_backoff: u32,
    last_fired: AtomicU32,
}

impl RateLimiter<SystemClock> {
    pub fn new(min_backoff: Duration) -> Self {
        Self::with_clock(min_backoff, SystemClock::default())
    }
}

impl Default for RateLimiter<SystemClock> {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BACKOFF)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// The backoff is capped just below 2^32 milliseconds.
    pub fn with_clock(min_backoff: Duration, clock: C) -> Self {
        let min_backoff = min_backoff.as_millis().min(u32::MAX as u128 - 1) as u32;

        // Start one tick further back than the backoff so that the very first
        // call is always permitted.
        let last_fired = AtomicU32::new(clock.now().wrapping_sub(min_backoff + 1));

        Self {
            min_backoff,
            last_fired,
            clock,
        }
    }

    pub fn min_backoff(&self) -> Duration {
        Duration::from_millis(self.min_backoff as u64)
    }

    /// # Test
    ///
    /// ```
    /// use std::time::Duration;
    /// use rtp_transport_service::limiter::{ManualClock, RateLimiter};
    ///
    /// let clock = ManualClock::new(0);
    /// let limiter = RateLimiter::with_clock(Duration::from_millis(100), clock.clone());
    ///
    /// assert!(limiter.should_run());
    ///
    /// clock.advance(100);
    /// assert!(!limiter.should_run());
    ///
    /// clock.advance(1);
    /// assert!(limiter.should_run());
    /// ```
    pub fn should_run(&self) -> bool {
        let now = self.clock.now();
        let last_fired = self.last_fired.load(Ordering::Acquire);

        if now.wrapping_sub(last_fired) <= self.min_backoff {
            return false;
        }

        // Only one of several racing callers wins the interval.
        self.last_fired
            .compare_exchange(last_fired, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
