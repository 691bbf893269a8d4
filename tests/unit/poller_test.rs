//! Attempt-budget behavior of the eventual-consistency poller.
//!
//! Uses a recording sleeper so no test waits out a real backoff.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use billrun::poller::{PollError, PollPolicy, PollStep, Poller, Sleeper};
use tokio::sync::watch;

/// Sleeper that records requested delays instead of waiting.
struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    fn new() -> (Self, Arc<Mutex<Vec<Duration>>>) {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                sleeps: Arc::clone(&sleeps),
            },
            sleeps,
        )
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

#[tokio::test]
async fn success_on_third_attempt_evaluates_exactly_three_times() {
    let (sleeper, sleeps) = RecordingSleeper::new();
    let poller = Poller::with_sleeper(PollPolicy::new(5, Duration::from_millis(200)), sleeper);

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let result = poller
        .poll(move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 < 3 {
                    PollStep::Retry(Some("row not visible yet".into()))
                } else {
                    PollStep::Done
                }
            }
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // Two backoffs, both at the configured delay; none after success
    let sleeps = sleeps.lock().unwrap();
    assert_eq!(sleeps.as_slice(), &[Duration::from_millis(200); 2]);
}

#[tokio::test]
async fn exhaustion_carries_the_last_observed_error() {
    let (sleeper, sleeps) = RecordingSleeper::new();
    let poller = Poller::with_sleeper(PollPolicy::new(5, Duration::from_millis(50)), sleeper);

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let result = poller
        .poll(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { PollStep::Retry(Some(format!("sync lag, attempt {}", n).into())) }
        })
        .await;

    match result {
        Err(PollError::Exhausted {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 5);
            let last = last_error.expect("last error should be surfaced");
            assert_eq!(last.to_string(), "sync lag, attempt 5");
        }
        other => panic!("expected Exhausted, got {:?}", other.map(|_| ())),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    // No sleep after the final attempt
    assert_eq!(sleeps.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn exhaustion_without_predicate_error_reports_none() {
    let (sleeper, _sleeps) = RecordingSleeper::new();
    let poller = Poller::with_sleeper(PollPolicy::new(3, Duration::ZERO), sleeper);

    let result = poller.poll(|| async { PollStep::Retry(None) }).await;

    match result {
        Err(PollError::Exhausted {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 3);
            assert!(last_error.is_none());
        }
        other => panic!("expected Exhausted, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn fatal_mid_poll_stops_consuming_the_budget() {
    let (sleeper, _sleeps) = RecordingSleeper::new();
    let poller = Poller::with_sleeper(PollPolicy::new(10, Duration::ZERO), sleeper);

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let result = poller
        .poll(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 1 {
                    PollStep::Retry(None)
                } else {
                    PollStep::Fatal("record was deleted".into())
                }
            }
        })
        .await;

    assert!(matches!(result, Err(PollError::Fatal(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancellation_interrupts_the_backoff_sleep() {
    // Real sleeper with a long delay; the cancel must win the race.
    let poller = Poller::new(PollPolicy::new(5, Duration::from_secs(30)));
    let (tx, mut rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = tx.send(true);
    });

    let start = std::time::Instant::now();
    let result = poller
        .poll_with_cancel(|| async { PollStep::Retry(None) }, &mut rx)
        .await;

    assert!(matches!(result, Err(PollError::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn spurious_non_cancel_update_does_not_shorten_the_backoff() {
    let poller = Poller::new(PollPolicy::new(2, Duration::from_millis(100)));
    let (tx, mut rx) = watch::channel(false);

    // A non-cancel send mid-backoff must neither cancel the poll nor let
    // the second attempt run before the delay has elapsed
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = tx.send(false);
        // Keep the sender alive past the backoff so the channel does not
        // close mid-sleep
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let start = std::time::Instant::now();
    let result = poller
        .poll_with_cancel(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 2 {
                        PollStep::Retry(None)
                    } else {
                        PollStep::Done
                    }
                }
            },
            &mut rx,
        )
        .await;

    assert!(result.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn already_cancelled_signal_skips_evaluation() {
    let poller = Poller::new(PollPolicy::new(5, Duration::ZERO));
    let (tx, mut rx) = watch::channel(true);

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let result = poller
        .poll_with_cancel(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { PollStep::Done }
            },
            &mut rx,
        )
        .await;

    assert!(matches!(result, Err(PollError::Cancelled)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    drop(tx);
}
