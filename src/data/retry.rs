use super::{DataError, DataResult};
use std::time::Duration;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};

/// Retry a fetch with jittered exponential backoff. Only errors classified as
/// retryable are retried, after first waiting out the error's `retry_delay`.
/// `max_attempts` counts retries after the first call.
pub async fn retry_with_backoff<F, Fut, T>(operation: F, max_attempts: usize) -> DataResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = DataResult<T>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(100)
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(max_attempts);

    RetryIf::spawn(
        retry_strategy,
        || async {
            let result = operation().await;
            if let Err(e) = &result {
                match e.retry_delay() {
                    Some(delay_secs) if e.is_retryable() => {
                        tracing::warn!(error = %e, delay_secs, "Retryable error, waiting before next attempt");
                        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                    }
                    _ if e.is_retryable() => tracing::warn!("Retryable error: {}", e),
                    _ => tracing::debug!("Non-retryable error: {}", e),
                }
            }
            result
        },
        |e: &DataError| e.is_retryable(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicUsize::new(0);
        let result = retry_with_backoff(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DataError::api_error(503, "unavailable"))
                } else {
                    Ok(42)
                }
            },
            3,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_out_suggested_delay() {
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();
        let result = retry_with_backoff(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(DataError::RateLimit { retry_after: 12 })
                } else {
                    Ok("quote")
                }
            },
            2,
        )
        .await;

        assert_eq!(result.unwrap(), "quote");
        assert!(started.elapsed() >= Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();
        let result: DataResult<()> = retry_with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DataError::Config("missing key".into()))
            },
            3,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
