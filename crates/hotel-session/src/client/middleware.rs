//! Middleware stack for ordinary API requests.
//!
//! Transient failures (connection errors, 5xx, 408, 429) can be retried with
//! exponential backoff. Authorization failures are never retried here; the
//! dispatcher owns that policy. The refresh call bypasses this stack.

use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

/// Wrap `client` with the transient-retry policy.
///
/// `max_retries == 0` yields a plain pass-through stack.
pub fn build_stack(client: reqwest::Client, max_retries: u32) -> ClientWithMiddleware {
    if max_retries == 0 {
        return ClientBuilder::new(client).build();
    }

    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(200), Duration::from_secs(10))
        .build_with_max_retries(max_retries);

    ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}
