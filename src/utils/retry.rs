use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;

/// Exponential-backoff retry. Only transport-level failures (timeout, 5xx,
/// connection errors) are retried; client errors return immediately.
///
/// `max_retries` excludes the first attempt, so the operation runs at most
/// `max_retries + 1` times.
pub async fn retry_with_backoff<F, Fut, T>(max_retries: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                let err_msg = e.to_string().to_lowercase();
                let is_retryable = err_msg.contains("timeout")
                    || err_msg.contains("timed out")
                    || err_msg.contains("connection")
                    || err_msg.contains("500")
                    || err_msg.contains("502")
                    || err_msg.contains("503")
                    || err_msg.contains("504")
                    || err_msg.contains("server error")
                    || err_msg.contains("broken pipe")
                    || err_msg.contains("reset by peer");

                if !is_retryable || attempt == max_retries {
                    return Err(e);
                }

                // 1s, 2s, 4s ...
                let delay = Duration::from_secs(1 << attempt);
                tracing::warn!(
                    "request failed (attempt {}), retrying in {}s: {}",
                    attempt + 1,
                    delay.as_secs(),
                    e
                );
                last_err = Some(e);
                sleep(delay).await;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("retry exhausted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_timeouts_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(anyhow::anyhow!("connection reset by peer"))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_with_backoff(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow::anyhow!("400 bad request")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
