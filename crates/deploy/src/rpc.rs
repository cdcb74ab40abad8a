//! Shared utilities for talking to Starknet JSON-RPC endpoints and waiting on them.

use std::time::{Duration, Instant};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Create an HTTP client for JSON-RPC requests, bounded by `timeout`.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Outcome of one polling attempt.
pub enum Poll<T> {
    Ready(T),
    Pending,
}

/// Repeatedly call `check_fn` every `interval` until it yields a value.
///
/// Errors returned by `check_fn` abort the wait immediately; use [`Poll::Pending`]
/// to keep waiting.
///
/// # Arguments
/// * `name` - What is being waited on (for error messages)
/// * `timeout` - Maximum time to wait
/// * `interval` - Delay between attempts
pub async fn poll_until<T, F, Fut>(
    name: &str,
    timeout: Duration,
    interval: Duration,
    check_fn: F,
) -> Result<T, anyhow::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Poll<T>, anyhow::Error>>,
{
    let start = Instant::now();

    loop {
        match check_fn().await? {
            Poll::Ready(value) => return Ok(value),
            Poll::Pending => {
                tracing::trace!(waiting_on = %name, "Not ready yet, retrying...");
            }
        }

        if start.elapsed() > timeout {
            anyhow::bail!("Timeout waiting for {} after {:?}", name, timeout);
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_poll_until_returns_once_ready() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;

        let value = poll_until(
            "counter",
            Duration::from_secs(5),
            Duration::from_millis(1),
            move || async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                Ok(if n >= 2 { Poll::Ready(n) } else { Poll::Pending })
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let result: anyhow::Result<()> = poll_until(
            "never",
            Duration::from_millis(5),
            Duration::from_millis(1),
            || async { Ok(Poll::Pending) },
        )
        .await;

        let err = result.unwrap_err().to_string();
        assert!(err.contains("Timeout waiting for never"), "{err}");
    }

    #[tokio::test]
    async fn test_poll_until_propagates_errors() {
        let result: anyhow::Result<()> = poll_until(
            "failing",
            Duration::from_secs(5),
            Duration::from_millis(1),
            || async { anyhow::bail!("boom") },
        )
        .await;

        assert_eq!(result.unwrap_err().to_string(), "boom");
    }
}
