use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{ApiError, ErrorClass};

/// Total attempts (initial call included) for a rate-limited ancillary request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
/// Upper bound for any single backoff wait.
pub const DEFAULT_CAP_DELAY: Duration = Duration::from_millis(8000);

pub(crate) fn rate_limit_text_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)rate.?limit|too.?many.?requests|usage.?limit")
            .expect("rate limit regex must compile")
    })
}

/// Bounded exponential backoff applied exclusively to rate-limit failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub cap_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            cap_delay: DEFAULT_CAP_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_cap_delay(mut self, cap_delay: Duration) -> Self {
        self.cap_delay = cap_delay;
        self
    }

    /// Backoff before retrying after failed attempt `attempt` (0-based):
    /// `min(base_delay * 2^attempt, cap_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(30));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.cap_delay)
            .min(self.cap_delay)
    }

    /// Whether a failure of `class` on attempt `attempt` (0-based) earns another try.
    pub fn should_retry(&self, class: ErrorClass, attempt: u32) -> bool {
        class == ErrorClass::RateLimit && attempt + 1 < self.max_attempts
    }

    /// Runs `call` until it succeeds, fails with a non-rate-limit classification,
    /// or runs out of attempts. `call` receives the 0-based attempt number.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> Result<T, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        loop {
            match call(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let class = error.class();
                    if !self.should_retry(class, attempt) {
                        if class == ErrorClass::RateLimit {
                            warn!(attempts = attempt + 1, %error, "rate limit persisted after final attempt");
                        }
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited; backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
