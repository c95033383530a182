use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Propagates a cancellation signal into the pipeline and arms a bounded
/// watchdog. The watchdog force-terminates the process if the pipeline has
/// not finished by the deadline, the one hard-cancellation path for the
/// case where a network call refuses to come back.
pub struct ShutdownController {
    token: CancellationToken,
    watchdog_timeout: Duration,
    finished: Arc<AtomicBool>,
}

impl ShutdownController {
    pub fn new(watchdog_timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            watchdog_timeout,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Token observed by the orchestrator and the retry wrapper.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn request_shutdown(&self) {
        if self.token.is_cancelled() {
            return;
        }
        info!(
            deadline_secs = self.watchdog_timeout.as_secs(),
            "shutdown requested, watchdog armed"
        );
        self.token.cancel();

        let finished = Arc::clone(&self.finished);
        let timeout = self.watchdog_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if !finished.load(Ordering::SeqCst) {
                error!(
                    timeout_secs = timeout.as_secs(),
                    "graceful shutdown stalled, forcing process exit"
                );
                std::process::exit(1);
            }
        });
    }

    /// Disarm the watchdog once the pipeline has drained.
    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}
