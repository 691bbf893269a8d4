//! Bounded-retry polling for eventually-consistent reads.
//!
//! Asynchronous propagation (event-driven sync into the billing store)
//! means a write is not always visible to the next read. Callers wrap the
//! read in a predicate and let the poller absorb the inconsistency window
//! instead of sprinkling sleeps through the code.

use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

/// Error type reported by poll predicates.
pub type PollSourceError = Box<dyn Error + Send + Sync + 'static>;

/// Result of a single predicate evaluation.
///
/// The predicate decides retryability itself: a transient miss returns
/// `Retry`, an unrecoverable condition returns `Fatal` and aborts the poll
/// without consuming the remaining attempts.
#[derive(Debug)]
pub enum PollStep {
    /// The expected state was observed; stop polling.
    Done,
    /// Not visible yet; sleep and try again, optionally noting what failed.
    Retry(Option<PollSourceError>),
    /// Unrecoverable condition; abort immediately.
    Fatal(PollSourceError),
}

#[derive(thiserror::Error, Debug)]
pub enum PollError {
    /// The attempt budget ran out before the predicate succeeded.
    #[error("retry budget exhausted after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        last_error: Option<PollSourceError>,
    },

    /// The cancellation signal fired between attempts.
    #[error("poll cancelled")]
    Cancelled,

    /// The predicate reported an unrecoverable condition.
    #[error("poll aborted: {0}")]
    Fatal(#[source] PollSourceError),
}

/// Attempt budget and per-attempt delay.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl PollPolicy {
    /// `max_attempts` is clamped to at least 1; a zero delay is allowed.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Clock seam so tests can poll without real delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Evaluates a predicate until it succeeds or the budget runs out.
pub struct Poller<S: Sleeper = TokioSleeper> {
    policy: PollPolicy,
    sleeper: S,
}

impl Poller<TokioSleeper> {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            sleeper: TokioSleeper,
        }
    }
}

impl<S: Sleeper> Poller<S> {
    /// Build a poller with an injected clock (used by tests).
    pub fn with_sleeper(policy: PollPolicy, sleeper: S) -> Self {
        Self { policy, sleeper }
    }

    /// Poll until the predicate reports `Done`.
    ///
    /// The predicate is evaluated at most `max_attempts` times, sleeping
    /// `delay` between attempts. Exhaustion carries the last error the
    /// predicate reported, if any.
    pub async fn poll<F, Fut>(&self, mut predicate: F) -> Result<(), PollError>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = PollStep> + Send,
    {
        let mut last_error: Option<PollSourceError> = None;

        for attempt in 1..=self.policy.max_attempts {
            match predicate().await {
                PollStep::Done => return Ok(()),
                PollStep::Fatal(err) => return Err(PollError::Fatal(err)),
                PollStep::Retry(err) => {
                    debug!(attempt, max_attempts = self.policy.max_attempts, "poll attempt not satisfied");
                    if err.is_some() {
                        last_error = err;
                    }
                }
            }

            if attempt < self.policy.max_attempts {
                self.sleeper.sleep(self.policy.delay).await;
            }
        }

        Err(PollError::Exhausted {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }

    /// Poll with a cancellation signal.
    ///
    /// The signal is a watch channel carrying `true` once cancellation is
    /// requested. It is raced against the backoff sleep, so a cancel during
    /// the delay aborts without waiting it out.
    pub async fn poll_with_cancel<F, Fut>(
        &self,
        mut predicate: F,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), PollError>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = PollStep> + Send,
    {
        let mut last_error: Option<PollSourceError> = None;

        for attempt in 1..=self.policy.max_attempts {
            if *cancel.borrow() {
                return Err(PollError::Cancelled);
            }

            match predicate().await {
                PollStep::Done => return Ok(()),
                PollStep::Fatal(err) => return Err(PollError::Fatal(err)),
                PollStep::Retry(err) => {
                    if err.is_some() {
                        last_error = err;
                    }
                }
            }

            if attempt < self.policy.max_attempts {
                // Only a true cancel (or a closed channel) ends the backoff;
                // spurious non-cancel updates let the sleep run its course.
                tokio::select! {
                    _ = self.sleeper.sleep(self.policy.delay) => {}
                    _ = cancel.wait_for(|cancelled| *cancelled) => {
                        return Err(PollError::Cancelled);
                    }
                }
            }
        }

        Err(PollError::Exhausted {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }
}
