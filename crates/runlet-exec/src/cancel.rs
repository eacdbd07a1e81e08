// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative cancellation for in-flight executions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Notify;

const LIVE: u8 = 0;
const EXPLICIT: u8 = 1;
const ABANDONED: u8 = 2;

/// Why an execution was asked to stop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller requested cancellation.
    Explicit,
    /// The handle was dropped while the run was still live.
    Abandoned,
}

/// Cloneable cancellation token; cancelling any clone wakes all waiters.
///
/// The first reason recorded wins; later calls only re-notify.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<AtomicU8>,
    notify: Arc<Notify>,
}

impl CancelToken {
    /// A fresh, non-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(LIVE)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Signal cancellation with the given reason.
    pub fn cancel(&self, reason: CancelReason) {
        let value = match reason {
            CancelReason::Explicit => EXPLICIT,
            CancelReason::Abandoned => ABANDONED,
        };
        let _ = self
            .state
            .compare_exchange(LIVE, value, Ordering::SeqCst, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// `true` once cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::SeqCst) != LIVE
    }

    /// The recorded reason, once cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        match self.state.load(Ordering::SeqCst) {
            EXPLICIT => Some(CancelReason::Explicit),
            ABANDONED => Some(CancelReason::Abandoned),
            _ => None,
        }
    }

    /// Wait until cancellation is signalled.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking so a cancel landing in between is not
        // lost; notify_waiters only wakes already-registered waiters.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_live() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn first_reason_wins() {
        let token = CancelToken::new();
        token.cancel(CancelReason::Abandoned);
        token.cancel(CancelReason::Explicit);
        assert_eq!(token.reason(), Some(CancelReason::Abandoned));
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel(CancelReason::Explicit);
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::Explicit));
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel(CancelReason::Explicit);
        token.cancelled().await;
    }

    #[tokio::test]
    async fn waiters_are_woken_by_any_clone() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let task = tokio::spawn(async move {
            waiter.cancelled().await;
            waiter.reason()
        });
        tokio::task::yield_now().await;
        token.cancel(CancelReason::Explicit);
        assert_eq!(task.await.unwrap(), Some(CancelReason::Explicit));
    }
}
