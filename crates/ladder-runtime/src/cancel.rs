//! Cooperative cancellation for in-flight answers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Cloneable cancellation signal.
///
/// Cancelling is sticky: once set, every current and future waiter sees it.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only returns once the flag is set
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Why a guarded call did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    TimedOut,
    Cancelled,
}

/// Run `fut` under a time limit and an optional cancellation token.
pub(crate) async fn guarded<F: Future>(
    fut: F,
    limit: Duration,
    cancel: Option<&CancelToken>,
) -> Result<F::Output, Interrupt> {
    let timed = tokio::time::timeout(limit, fut);
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(Interrupt::Cancelled),
            result = timed => result.map_err(|_| Interrupt::TimedOut),
        },
        None => timed.await.map_err(|_| Interrupt::TimedOut),
    }
}
