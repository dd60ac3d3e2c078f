//! Exponential-backoff retry middleware for transient payment-submission
//! failures.
//!
//! Grounded on the teacher's `X402Client` request/retry middleware: a
//! `reqwest_middleware::Middleware` that intercepts one outcome and,
//! on a retryable condition, clones and resends the original request.
//! Here the retryable conditions are connection errors, timeouts, and 5xx
//! responses, not a 402 challenge — retrying is safe because every vendor
//! payment endpoint is idempotent on `(channel_id, cumulative amount / k /
//! i, payload bytes)`.

use std::time::Duration;

use reqwest::{Request, Response, StatusCode};
use reqwest_middleware::{Error, Middleware, Next, Result};
use tracing::{debug, warn};

/// Retries a request up to `max_retries` times with exponential backoff,
/// doubling from `base_delay` on each attempt, when the prior attempt
/// failed to connect, timed out, or the peer answered with a 5xx status.
#[derive(Debug, Clone, Copy)]
pub struct RetryMiddleware {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryMiddleware {
    /// Builds a retry layer with up to `max_retries` additional attempts
    /// beyond the first, starting at `base_delay` and doubling each time.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }
}

impl Default for RetryMiddleware {
    /// Three retries, starting at 200ms (200ms, 400ms, 800ms).
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
}

fn is_retryable_reqwest_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[async_trait::async_trait]
impl Middleware for RetryMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let mut attempt: u32 = 0;
        let mut delay = self.base_delay;
        let mut pending = Some(req);

        loop {
            let req = pending.take().expect("request present on every iteration");
            let retry_clone = req.try_clone();
            let outcome = next.clone().run(req, extensions).await;

            let should_retry = match &outcome {
                Ok(response) => is_retryable_status(response.status()),
                Err(Error::Reqwest(source)) => is_retryable_reqwest_error(source),
                Err(Error::Middleware(_)) => false,
            };

            if !should_retry || attempt >= self.max_retries {
                return outcome;
            }

            let Some(retry_req) = retry_clone else {
                debug!("request body not cloneable, cannot retry");
                return outcome;
            };

            warn!(attempt, ?delay, "retrying request after transient failure");
            tokio::time::sleep(delay).await;
            attempt += 1;
            delay *= 2;
            pending = Some(retry_req);
        }
    }
}
