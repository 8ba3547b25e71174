use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

use crate::error::LlmError;

/// Retry schedule for rate-limited (HTTP 429) responses.
///
/// A server-supplied `Retry-After` (in seconds) wins over the doubling schedule; both
/// are bounded by `max_delay`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimitRetry {
    pub attempts: u32,
    pub first_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RateLimitRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            first_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RateLimitRetry {
    fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let scheduled = retry_after
            .unwrap_or_else(|| self.first_delay.saturating_mul(2u32.saturating_pow(retry)));
        scheduled.min(self.max_delay)
    }

    /// Run `send` until it yields a non-429 response or the attempts are used up.
    ///
    /// # Errors
    ///
    /// `LlmError::RateLimited` when every retry was rate limited, `LlmError::Http` on a
    /// transport failure (never retried).
    pub(crate) async fn run<F, Fut>(
        &self,
        provider: &'static str,
        mut send: F,
    ) -> Result<reqwest::Response, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut retry = 0;
        loop {
            let response = send().await.map_err(LlmError::Http)?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }
            if retry >= self.attempts {
                return Err(LlmError::RateLimited);
            }
            let delay = self.delay_for(retry, retry_after(&response));
            retry += 1;
            tracing::warn!(
                provider,
                retry,
                of = self.attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "rate limited"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}
