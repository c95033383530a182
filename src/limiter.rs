use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Sliding-window throttle for outbound marketplace API calls.
///
/// `acquire` suspends the caller until fewer than `max_requests` calls have
/// been recorded in the trailing `window`, then records the call and returns.
/// Callers are never rejected; under sustained overload they simply wait.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut stamps = self.timestamps.lock().await;
                let now = Instant::now();
                while stamps
                    .front()
                    .is_some_and(|&t| now.duration_since(t) >= self.window)
                {
                    stamps.pop_front();
                }
                if stamps.len() < self.max_requests {
                    stamps.push_back(now);
                    return;
                }
                // Oldest recorded call leaves the window first; sleep until then.
                self.window - now.duration_since(stamps[0])
            };
            debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn acquires_up_to_limit_without_waiting() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn over_limit_call_waits_for_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn window_bound_holds_for_concurrent_callers() {
        let limiter = Arc::new(RateLimiter::new(5, Duration::from_secs(60)));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let completions: Vec<Instant> = join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.expect("task panicked"))
            .collect();

        // No sliding 60s window may contain more than 5 completed acquires.
        for &anchor in &completions {
            let in_window = completions
                .iter()
                .filter(|&&t| t >= anchor && t - anchor < Duration::from_secs(60))
                .count();
            assert!(in_window <= 5, "{in_window} acquires inside one window");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn old_entries_expire_and_free_slots() {
        let limiter = RateLimiter::new(1, Duration::from_secs(5));
        limiter.acquire().await;

        tokio::time::sleep(Duration::from_secs(5)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
