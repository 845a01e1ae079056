// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cancellation primitive threaded through every blocking operation.
//!
//! One token is created per job execution; the scheduler cancels all live
//! tokens on shutdown. Database, HTTP, and filesystem paths either await
//! [`CancelToken::cancelled`] in a `select!` or poll
//! [`CancelToken::bail_if_cancelled`] inside row loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Raised by [`CancelToken::bail_if_cancelled`] once the token fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// A cloneable token used to signal cancellation to an execution.
///
/// All clones share the same state; cancelling any clone makes every clone
/// observe `is_cancelled() == true` and wakes all pending waiters.
#[derive(Clone, Default)]
pub struct CancelToken {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    fired: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// A fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.shared.fired.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }

    /// Whether [`cancel`](Self::cancel) has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.fired.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` once the token has fired.
    ///
    /// Intended for long inner loops (row fetches, column encoding) that
    /// have no natural await point.
    pub fn bail_if_cancelled(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve when the token is cancelled; immediately if it already was.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        loop {
            self.shared.notify.notified().await;
            if self.is_cancelled() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
