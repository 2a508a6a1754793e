// src/ingest/http.rs
//! Shared HTTP plumbing: one client, bounded timeouts, linear-backoff retries.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder, Response};

use crate::config::fetch::FetchSettings;

/// How one network call is bounded.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(settings: &FetchSettings, timeout: Duration) -> Self {
        Self {
            retries: settings.retries,
            backoff: settings.backoff,
            timeout,
        }
    }
}

pub fn build_client(settings: &FetchSettings) -> Result<Client> {
    Client::builder()
        .user_agent(settings.user_agent.clone())
        .connect_timeout(Duration::from_secs(5))
        .build()
        .context("building http client")
}

/// Send the request built by `make`, retrying on transport errors, timeouts and non-2xx.
///
/// Attempt `n` (1-based) that fails waits `backoff * n` before the next one. The last
/// failure is returned as the error.
pub async fn send_with_retry<F>(make: F, policy: RetryPolicy, what: &str) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = anyhow!("{what}: no attempt made");
    for attempt in 0..=policy.retries {
        match make().timeout(policy.timeout).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(resp),
            Ok(resp) => {
                last_err = anyhow!("{what} status {}", resp.status().as_u16());
            }
            Err(e) if e.is_timeout() => {
                last_err = anyhow!("{what} timed out after {:?}", policy.timeout);
            }
            Err(e) => {
                last_err = anyhow::Error::new(e).context(format!("{what} request failed"));
            }
        }

        if attempt < policy.retries {
            let wait = policy.backoff.saturating_mul(attempt + 1);
            tracing::debug!(
                request = what,
                attempt = attempt + 1,
                retries = policy.retries,
                wait_ms = wait.as_millis() as u64,
                error = %last_err,
                "retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }
    Err(last_err)
}
