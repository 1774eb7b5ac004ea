//! Cooperative cancellation.
//!
//! A [`CancelToken`] is cloned into every long-running operation and checked
//! at each suspension point (frame waits, image loads, encoder writes).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::{KeepsakeError, KeepsakeResult};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared cancellation signal. Cloning yields a handle to the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every holder of this token.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            tracing::debug!("Cancellation requested");
        }
        self.state.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` if cancellation was requested.
    pub fn check(&self) -> KeepsakeResult<()> {
        if self.is_cancelled() {
            Err(KeepsakeError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel() is not missed.
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Drive `fut` to completion unless the token fires first.
    pub async fn run_until_cancelled<F, T>(&self, fut: F) -> KeepsakeResult<T>
    where
        F: Future<Output = T>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(KeepsakeError::Cancelled),
            value = fut => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
        assert!(other.check().unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn test_run_until_cancelled_returns_value() {
        let token = CancelToken::new();
        let value = token.run_until_cancelled(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_until_cancelled_aborts_pending_future() {
        let token = CancelToken::new();
        token.cancel();
        let result = token
            .run_until_cancelled(std::future::pending::<()>())
            .await;
        assert!(matches!(result, Err(KeepsakeError::Cancelled)));
    }
}
