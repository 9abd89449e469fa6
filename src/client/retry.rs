use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result, TransportError};
use crate::http::{HttpRequest, HttpResponse, Transport};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
/// Upper bound for a single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(3600);

/// Lowercase fragments of transport errors worth another attempt.
const RETRYABLE_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "timeout",
    "timed out",
    "temporary failure",
    "eof",
    "too many open files",
    "no such host",
    "dns error",
    "failed to lookup address",
];

/// Exponential backoff over transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Build from template settings; non-positive values take the defaults.
    pub fn from_settings(max_attempts: i64, initial_delay_ms: i64, backoff_factor: f64) -> Self {
        Self {
            max_attempts: u32::try_from(max_attempts)
                .ok()
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            initial_delay: u64::try_from(initial_delay_ms)
                .ok()
                .filter(|ms| *ms > 0)
                .map_or(DEFAULT_INITIAL_DELAY, Duration::from_millis)
                .min(MAX_DELAY),
            backoff_factor: if backoff_factor > 0.0 {
                backoff_factor
            } else {
                DEFAULT_BACKOFF_FACTOR
            },
        }
    }

    /// Send `request`, retrying retryable failures. Each attempt gets its
    /// own copy of the request.
    pub async fn send(&self, transport: &dyn Transport, request: &HttpRequest) -> Result<HttpResponse> {
        let mut delay = self.initial_delay;
        let mut attempt = 1;
        loop {
            debug!(attempt, max_attempts = self.max_attempts, url = %request.url, "sending request");
            let err = match transport.send(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            if !is_retryable(&err) {
                return Err(Error::Transport(err));
            }
            if attempt >= self.max_attempts {
                return Err(Error::RetryExhausted {
                    attempts: self.max_attempts,
                    source: err,
                });
            }
            warn!(attempt, delay = ?delay, error = %err, "retryable transport failure");
            tokio::time::sleep(delay).await;
            delay = next_delay(delay, self.backoff_factor);
            attempt += 1;
        }
    }
}

/// `delay * factor`, saturating at [`MAX_DELAY`].
fn next_delay(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
        .map_or(MAX_DELAY, |next| next.min(MAX_DELAY))
}

pub fn is_retryable(err: &TransportError) -> bool {
    let message = err.message().to_lowercase();
    RETRYABLE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}
