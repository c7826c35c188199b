//! Async assertion helpers.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};

/// Poll interval used by [`eventually`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default limit for waits in integration suites.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(10);

/// Re-run `check` until it returns `true` or `limit` elapses.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(limit, async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .is_ok()
}

/// Await `future`, failing with a descriptive error after `limit`.
///
/// # Errors
///
/// Returns an error naming `what` when the future does not complete in time.
pub async fn within<F: Future>(limit: Duration, what: &str, future: F) -> Result<F::Output> {
    tokio::time::timeout(limit, future)
        .await
        .with_context(|| format!("timed out after {limit:?} waiting for {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn eventually_retries_until_true() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ok = eventually(Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move { counter.fetch_add(1, Ordering::SeqCst) >= 2 }
        })
        .await;
        assert!(ok);
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn eventually_gives_up() {
        assert!(!eventually(Duration::from_millis(30), || async { false }).await);
    }

    #[tokio::test]
    async fn within_reports_timeout() {
        let err = within(Duration::from_millis(5), "never", std::future::pending::<()>())
            .await
            .expect_err("must time out");
        assert!(err.to_string().contains("never"));
        assert_eq!(within(DEFAULT_WAIT, "ready", async { 7 }).await.expect("ready"), 7);
    }
}
