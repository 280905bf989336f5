use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, anyhow};
use codec::{FeedbackMessage, FeedbackType, PacketClassifier, feedback::ps};
use parking_lot::Mutex;
use rtp_transport_service::{
    ClassifierFilter, FeedbackDispatcher, FeedbackEvent, FeedbackListener, ManualClock,
    RateLimiter, StrategyRegistry,
};

trait Detector: Send {
    fn name(&self) -> &'static str;
}

struct Dominant;

impl Detector for Dominant {
    fn name(&self) -> &'static str {
        "dominant"
    }
}

fn registry() -> StrategyRegistry<Box<dyn Detector>> {
    let mut registry = StrategyRegistry::<Box<dyn Detector>>::default();
    registry
        .register("a", || Err(anyhow!("a is broken")))
        .register("b", || Err(anyhow!("b is broken")))
        .register("c", || Ok(Box::new(Dominant) as Box<dyn Detector>));

    registry
}

#[test]
fn test_strategy_fallback_chain() -> Result<()> {
    let selected = registry().select(None, &["a", "b", "c"])?;

    assert_eq!(selected.name, "c");
    assert_eq!(selected.strategy.name(), "dominant");
    assert_eq!(
        selected.failures.iter().map(|it| it.name.as_str()).collect::<Vec<_>>(),
        vec!["a", "b"]
    );

    Ok(())
}

#[test]
fn test_strategy_override_first() -> Result<()> {
    let selected = registry().select(Some("c"), &["a", "c"])?;

    assert_eq!(selected.name, "c");
    assert!(selected.failures.is_empty());

    // An unknown override is recorded and skipped.
    let selected = registry().select(Some("missing"), &["c"])?;
    assert_eq!(selected.name, "c");
    assert_eq!(selected.failures.len(), 1);
    assert_eq!(selected.failures[0].name, "missing");

    Ok(())
}

#[test]
fn test_strategy_exhausted() -> Result<()> {
    let Err(error) = registry().select(None, &["a", "b", "missing"]) else {
        return Err(anyhow!("Expected NoImplementationAvailable"));
    };

    assert_eq!(error.attempted, vec!["a", "b", "missing"]);
    assert!(
        error
            .last_cause
            .as_ref()
            .map(|it| it.to_string().contains("missing"))
            .unwrap_or(false)
    );

    let Err(error) = registry().select(Some(""), &["a", "b"]) else {
        return Err(anyhow!("Expected NoImplementationAvailable"));
    };

    assert_eq!(error.attempted, vec!["a", "b"]);
    assert_eq!(error.last_cause.map(|it| it.to_string()), Some("b is broken".to_string()));

    Ok(())
}

#[test]
fn test_rate_limiter() {
    let clock = ManualClock::new(0);
    let limiter = RateLimiter::with_clock(Duration::from_secs(10), clock.clone());

    assert!(limiter.should_run());

    clock.advance(5_000);
    assert!(!limiter.should_run());

    clock.advance(5_001);
    assert!(limiter.should_run());
    assert!(!limiter.should_run());
}

#[test]
fn test_filter_rate_limits_reports() {
    let clock = ManualClock::new(0);
    let filter = ClassifierFilter::with_limiter(
        PacketClassifier::rtp(),
        RateLimiter::with_clock(Duration::from_secs(1), clock.clone()),
    );

    let rtcp = FeedbackMessage::pli(1, 2).to_bytes();
    for _ in 0..100 {
        assert!(!filter.accept(&rtcp));
    }

    assert!(filter.accept(&[0x80, 0x60, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]));
    assert_eq!(filter.stats().mismatched, 100);
    assert_eq!(filter.stats().rejected, 0);
}

#[test]
fn test_dispatch_order_and_errors() -> Result<()> {
    let dispatcher = FeedbackDispatcher::default();
    let calls = Arc::new(Mutex::new(Vec::new()));

    let make = |tag: &'static str, fail: bool| -> Arc<dyn FeedbackListener> {
        let calls = calls.clone();
        Arc::new(move |event: &FeedbackEvent| {
            calls.lock().push((tag, *event));

            if fail {
                Err(anyhow!("{tag} failed"))
            } else {
                Ok(())
            }
        })
    };

    let first = make("first", false);
    let second = make("second", true);
    let third = make("third", false);

    assert!(dispatcher.add(first.clone()));
    assert!(!dispatcher.add(first.clone()));
    assert!(dispatcher.add(second.clone()));
    assert!(dispatcher.add(third.clone()));
    assert_eq!(dispatcher.len(), 3);

    let bytes = FeedbackMessage::fir(7, 9, 1).to_bytes();
    let error = dispatcher.dispatch(&bytes).err().ok_or(anyhow!("Expected error"))?;
    assert_eq!(error.to_string(), "second failed");

    let expected = FeedbackEvent {
        source: 9,
        fmt: ps::FIR,
        payload_type: FeedbackType::PayloadSpecific,
    };

    assert_eq!(*calls.lock(), vec![("first", expected), ("second", expected)]);

    calls.lock().clear();
    assert!(dispatcher.remove(&second));
    assert!(!dispatcher.remove(&second));

    let message = dispatcher.dispatch(&bytes)?;
    assert_eq!(message, Some(FeedbackMessage::fir(7, 9, 1)));
    assert_eq!(*calls.lock(), vec![("first", expected), ("third", expected)]);

    Ok(())
}

#[test]
fn test_dispatch_skips_non_feedback() -> Result<()> {
    let dispatcher = FeedbackDispatcher::default();
    let count = Arc::new(AtomicUsize::new(0));

    {
        let count = count.clone();
        dispatcher.add(Arc::new(move |_: &FeedbackEvent| {
            count.fetch_add(1, Ordering::Relaxed);
            Ok::<_, anyhow::Error>(())
        }));
    }

    let sender_report = [0x80u8, 200, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2];
    assert_eq!(dispatcher.dispatch(&sender_report)?, None);
    assert_eq!(dispatcher.dispatch(&sender_report[..8])?, None);
    assert_eq!(count.load(Ordering::Relaxed), 0);

    let nack = FeedbackMessage::new(FeedbackType::TransportLayer, 1, 3, 4).to_bytes();
    assert!(dispatcher.dispatch(&nack)?.is_some());
    assert_eq!(count.load(Ordering::Relaxed), 1);

    Ok(())
}
