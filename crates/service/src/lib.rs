pub mod dispatcher;
pub mod filter;
pub mod limiter;
pub mod pool;
pub mod strategy;

pub use self::{
    dispatcher::{FeedbackDispatcher, FeedbackEvent, FeedbackListener},
    filter::{ClassifierFilter, FilterStats},
    limiter::{Clock, ManualClock, RateLimiter, SystemClock},
    pool::{BufferPool, PooledBuffer},
    strategy::{NoImplementationAvailable, Selected, StrategyRegistry},
};
