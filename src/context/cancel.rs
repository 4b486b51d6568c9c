// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cancellation and deadlines.
//!
//! A context is cancelled when its token is cancelled (directly or through a
//! parent) or when its deadline has passed. Deadlines are checked when asked;
//! nothing fires in the background.

use std::time::{Duration, Instant};

use tokio_util::sync::{CancellationToken, DropGuard};

use super::Context;
use crate::error::ContextError;

/// Cancels a derived context.
///
/// Dropping the handle cancels too, so the derived context never outlives
/// the scope that created it unless [`disarm`](Self::disarm) is called.
#[must_use = "dropping the handle cancels the derived context"]
pub struct CancelHandle {
    token: CancellationToken,
    guard: Option<DropGuard>,
}

impl CancelHandle {
    fn new(token: CancellationToken) -> Self {
        Self {
            guard: Some(token.clone().drop_guard()),
            token,
        }
    }

    /// Cancel the derived context and everything derived from it. The parent
    /// is unaffected. Calling it more than once is harmless.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Stop cancelling on drop and return the underlying token.
    pub fn disarm(mut self) -> CancellationToken {
        match self.guard.take() {
            Some(guard) => guard.disarm(),
            None => self.token.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.token.is_cancelled())
            .field("armed", &self.guard.is_some())
            .finish()
    }
}

impl Context {
    /// Derive a context that can be cancelled on its own.
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let child = self.inner.cancel.child_token();
        let ctx = self.derive(|c| c.cancel = child.clone());
        (ctx, CancelHandle::new(child))
    }

    /// Derive a context that expires at `deadline`, or at the parent's
    /// deadline if that is earlier.
    pub fn with_deadline(&self, deadline: Instant) -> (Context, CancelHandle) {
        let deadline = match self.inner.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        let child = self.inner.cancel.child_token();
        let ctx = self.derive(|c| {
            c.cancel = child.clone();
            c.deadline = Some(deadline);
        });
        (ctx, CancelHandle::new(child))
    }

    /// Derive a context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> (Context, CancelHandle) {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.with_cancel(),
        }
    }

    /// When this context expires, if it has a deadline.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Why this context is no longer active, or `None` while it is.
    ///
    /// Explicit cancellation is reported before an expired deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.inner.cancel.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.err().is_some()
    }

    /// `Err` once the context is cancelled or expired.
    pub fn check(&self) -> Result<(), ContextError> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// The token backing this context, for handing to async code.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Wait until the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.inner.cancel.cancelled() => ContextError::Canceled,
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                        ContextError::DeadlineExceeded
                    }
                }
            }
            None => {
                self.inner.cancel.cancelled().await;
                ContextError::Canceled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_propagates_to_children_only() {
        let root = Context::background();
        let (parent, parent_handle) = root.with_cancel();
        let (child, _child_handle) = parent.with_cancel();

        parent_handle.cancel();
        assert_eq!(parent.err(), Some(ContextError::Canceled));
        assert_eq!(child.err(), Some(ContextError::Canceled));
        assert!(root.err().is_none());
    }

    #[test]
    fn test_child_cancel_leaves_parent_active() {
        let (parent, _handle) = Context::background().with_cancel();
        let (child, child_handle) = parent.with_cancel();
        child_handle.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_drop_cancels_unless_disarmed() {
        let root = Context::background();
        let (dropped, handle) = root.with_cancel();
        drop(handle);
        assert!(dropped.is_cancelled());

        let (kept, handle) = root.with_cancel();
        let token = handle.disarm();
        assert!(!kept.is_cancelled());
        token.cancel();
        assert!(kept.is_cancelled());
    }

    #[test]
    fn test_deadline_is_clamped_to_parent() {
        let root = Context::background();
        let (parent, _p) = root.with_timeout(Duration::from_secs(1));
        let (child, _c) = parent.with_timeout(Duration::from_secs(3600));
        assert_eq!(child.deadline(), parent.deadline());
        assert!(root.deadline().is_none());
    }

    #[test]
    fn test_expired_deadline() {
        let (ctx, _handle) = Context::background().with_deadline(Instant::now());
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
        assert_eq!(ctx.check(), Err(ContextError::DeadlineExceeded));
    }

    #[test]
    fn test_with_cancellation_replaces_token() {
        let token = CancellationToken::new();
        let (timed, _handle) = Context::background().with_deadline(Instant::now());
        let ctx = timed.with_cancellation(token.clone());
        assert!(ctx.deadline().is_none());
        assert!(ctx.check().is_ok());
        token.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Canceled));
    }

    #[tokio::test]
    async fn test_done_resolves_on_cancel() {
        let (ctx, handle) = Context::background().with_cancel();
        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.done().await }
        });
        handle.cancel();
        assert_eq!(waiter.await.unwrap(), ContextError::Canceled);
    }

    #[tokio::test]
    async fn test_done_resolves_on_deadline() {
        let (ctx, _handle) = Context::background().with_timeout(Duration::from_millis(20));
        assert_eq!(ctx.done().await, ContextError::DeadlineExceeded);
    }
}
