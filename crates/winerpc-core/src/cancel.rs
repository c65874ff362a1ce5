//! Shutdown signalling shared by the main loop and plugin tasks.
//!
//! A `CancellationToken` can be polled (`is_cancelled`) from synchronous code and
//! awaited (`cancelled`) at any suspension point in async code. Cancellation is
//! one-way: once requested it stays requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cancellation token for cooperative cancellation of async tasks.
///
/// Clones share state. When `cancel()` is called on any clone, all clones
/// observe it and every pending `cancelled()` future resolves.
///
/// # Example
///
/// ```
/// use winerpc_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let token_clone = token.clone();
///
/// token_clone.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Create a new cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every task waiting in `cancelled()`.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is requested.
    ///
    /// Returns immediately if the token is already cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            // Register interest before re-checking the flag so a concurrent
            // cancel() between the check and the await is not lost.
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }

            notified.await;
        }
    }

    /// Check cancellation and return an error if cancelled.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }
}

/// Error returned when an operation is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl std::fmt::Display for CancelledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation was cancelled")
    }
}

impl std::error::Error for CancelledError {}
