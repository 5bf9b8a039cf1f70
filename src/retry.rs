//! Retry policy shared by page fetching and artifact delivery
//!
//! A [`RetryPolicy`] is parameterized by an attempt bound, a backoff function
//! and the error's own [`Classify`] verdict. Rate-limit waits are tracked
//! separately from transient failures: delivery waits them out indefinitely,
//! page fetching caps them.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// How a failed attempt should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The remote asked us to wait this long before trying again
    RateLimited(Duration),
    /// Timeout, connection reset, 5xx
    Transient,
    /// Retrying cannot help
    Fatal,
}

/// Errors that know whether they are worth retrying
pub trait Classify {
    fn classify(&self) -> FailureClass;
}

/// Delay between transient attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// base * 2^(n-1), capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the `failures`-th transient failure (1-based)
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(failures.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("non-retryable failure: {0}")]
    Fatal(E),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed while failures are transient
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Added on top of every rate-limit wait
    pub rate_limit_margin: Duration,
    /// `None` waits out rate limits forever
    pub max_rate_limit_waits: Option<u32>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            rate_limit_margin: Duration::ZERO,
            max_rate_limit_waits: Some(0),
        }
    }

    pub fn with_rate_limit_margin(mut self, margin: Duration) -> Self {
        self.rate_limit_margin = margin;
        self
    }

    pub fn with_rate_limit_waits(mut self, max_waits: Option<u32>) -> Self {
        self.max_rate_limit_waits = max_waits;
        self
    }

    /// Decide on the next step given the counters *including* this failure
    pub fn decide(
        &self,
        class: FailureClass,
        transient_failures: u32,
        rate_limit_waits: u32,
    ) -> RetryDecision {
        match class {
            FailureClass::Fatal => RetryDecision::GiveUp,
            FailureClass::Transient if transient_failures >= self.max_attempts => {
                RetryDecision::GiveUp
            }
            FailureClass::Transient => {
                RetryDecision::RetryAfter(self.backoff.delay(transient_failures))
            }
            FailureClass::RateLimited(wait) => match self.max_rate_limit_waits {
                Some(limit) if rate_limit_waits > limit => RetryDecision::GiveUp,
                _ => RetryDecision::RetryAfter(wait + self.rate_limit_margin),
            },
        }
    }

    /// Run `op` until it succeeds or the policy gives up
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Classify + fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempts = 0u32;
        let mut transient_failures = 0u32;
        let mut rate_limit_waits = 0u32;

        loop {
            attempts += 1;
            let err = match op(attempts).await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(label, attempts, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let class = err.classify();
            match class {
                FailureClass::Transient => transient_failures += 1,
                FailureClass::RateLimited(_) => rate_limit_waits += 1,
                FailureClass::Fatal => {}
            }

            match self.decide(class, transient_failures, rate_limit_waits) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(label, attempts, error = %err, delay_ms = delay.as_millis() as u64, "Attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp if class == FailureClass::Fatal => {
                    return Err(RetryError::Fatal(err));
                }
                RetryDecision::GiveUp => {
                    warn!(label, attempts, error = %err, "Giving up");
                    return Err(RetryError::Exhausted { attempts, last: err });
                }
            }
        }
    }
}
