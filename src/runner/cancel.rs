//! Cooperative cancellation with optional deadlines
//!
//! The supervisor composes a token tree: the root carries the total
//! timeout, each iteration derives a child narrowed by the per-iteration
//! timeout. Cancellation propagates downward through the shared watch
//! channel; deadlines narrow monotonically. The runner needs to tell a
//! deadline expiry apart from an explicit cancel, so waiting yields a
//! cause.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a wait on the token returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// Explicitly cancelled through the handle.
    Cancelled,
    /// The token's deadline passed.
    Expired,
}

/// Sender half; cancelling is idempotent.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cloneable observer half, optionally bounded by a deadline.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx, deadline: None })
    }

    /// A token that can only expire, never be cancelled.
    pub fn with_timeout(timeout: Duration) -> CancelToken {
        let (handle, token) = CancelToken::new();
        // Leak the sender so the channel stays open for the token's life.
        std::mem::forget(handle);
        token.child(Some(timeout))
    }

    /// Derive a child narrowed by `timeout` from now. The child observes
    /// the parent's cancellation and keeps the earlier of the two
    /// deadlines.
    pub fn child(&self, timeout: Option<Duration>) -> CancelToken {
        let new_deadline = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, new_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        CancelToken {
            rx: self.rx.clone(),
            deadline,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Wait until the token is cancelled or its deadline passes. Pends
    /// forever on a deadline-free token whose handle is never used.
    pub async fn cancelled(&self) -> CancelCause {
        let mut rx = self.rx.clone();
        let expiry = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => futures::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);

        loop {
            if *rx.borrow() {
                return CancelCause::Cancelled;
            }
            tokio::select! {
                _ = &mut expiry => return CancelCause::Expired,
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Handle dropped without cancelling: only the
                        // deadline can end the wait now.
                        (&mut expiry).await;
                        return CancelCause::Expired;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn explicit_cancel_is_observed() {
        let (handle, token) = CancelToken::new();
        let waiter = tokio::spawn(async move { token.cancelled().await });
        handle.cancel();
        assert_eq!(waiter.await.unwrap(), CancelCause::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_is_distinguished() {
        let token = CancelToken::with_timeout(Duration::from_secs(5));
        assert_eq!(token.cancelled().await, CancelCause::Expired);
        assert!(token.is_expired());
        assert!(!token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn child_keeps_earlier_deadline() {
        let parent = CancelToken::with_timeout(Duration::from_secs(2));
        let child = parent.child(Some(Duration::from_secs(60)));
        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.child(Some(Duration::from_secs(1)));
        assert!(tighter.deadline().unwrap() < parent.deadline().unwrap());
    }

    #[tokio::test]
    async fn child_observes_parent_cancel() {
        let (handle, parent) = CancelToken::new();
        let child = parent.child(Some(Duration::from_secs(600)));
        handle.cancel();
        assert_eq!(child.cancelled().await, CancelCause::Cancelled);
    }
}
