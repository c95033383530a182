use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::MAX_BACKOFF;
use crate::error::{AppError, Result};

/// Invoke `op` with bounded retries and exponential backoff.
///
/// Only transient failures (see `AppError::is_transient`) are retried; the
/// operation runs at most `max_retries + 1` times and the last error is
/// propagated on exhaustion. A cancellation observed before an attempt or
/// during a backoff sleep aborts immediately with `AppError::Cancelled`,
/// which callers can tell apart from exhaustion.
pub async fn retry_with_backoff<T, F, Fut>(
    mut op: F,
    max_retries: u32,
    base_delay: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_retries => {
                let delay = backoff_delay(base_delay, attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// `base * 2^attempt`, capped at `MAX_BACKOFF`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_BACKOFF)
}
