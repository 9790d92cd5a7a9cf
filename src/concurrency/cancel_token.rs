//! Cancellation tokens, one per supervised worker.
//!
//! `Agent::run` holds one root token and cuts a labeled child for each
//! pipeline worker it spawns (ingest, stage-in, stage-out, exec, watcher,
//! update); the Heartbeat monitor cancels the root on a wall-clock deadline,
//! an observed `CANCEL_PILOT`, or a dead worker, and that cascades to every
//! child without the caller tracking them individually. `CANCEL_COMPUTE_UNIT`
//! is a narrower cut — it targets one in-flight unit's child process and is
//! routed through the Watcher's own uid-keyed channel (`pipeline::watcher`)
//! rather than through a token, since a single unit has no worker of its own
//! to hold one.
//!
//! # Example
//! ```no_run
//! use pilot_agent::concurrency::CancelToken;
//!
//! async fn example() {
//!     let root = CancelToken::new();
//!     let watcher_token = root.child_token("watcher");
//!
//!     tokio::spawn({
//!         let watcher_token = watcher_token.clone();
//!         async move {
//!             tokio::select! {
//!                 _ = watcher_token.cancelled() => {
//!                     // stop polling, the agent is tearing down
//!                 }
//!                 _ = poll_children() => {}
//!             }
//!         }
//!     });
//!
//!     // Heartbeat monitor hitting the runtime deadline cancels everyone.
//!     root.cancel();
//! }
//!
//! async fn poll_children() {
//!     tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
//! }
//! ```

use std::sync::Arc;
use tokio::sync::Notify;
use parking_lot::RwLock;

/// The root token is labeled `"root"`; every child carries the name of the
/// worker it was cut for, so a cancellation can be traced back to the
/// Supervised entry (`pipeline::heartbeat::Supervised::name`) that owns it.
const ROOT_LABEL: &str = "root";

/// A token for cooperative task cancellation
///
/// The token can be cloned and shared across tasks. When cancelled,
/// all instances of the token are notified.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelTokenInner>,
}

struct CancelTokenInner {
    /// Whether this token has been cancelled
    cancelled: RwLock<bool>,

    /// Notifier for cancellation
    notify: Notify,

    /// Parent token (if this is a child)
    parent: Option<CancelToken>,

    /// Child tokens
    children: RwLock<Vec<CancelToken>>,

    /// Name of the worker this token was cut for (`"root"` for the agent's
    /// top-level token)
    label: &'static str,
}

impl CancelToken {
    /// Create a new root cancellation token
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelTokenInner {
                cancelled: RwLock::new(false),
                notify: Notify::new(),
                parent: None,
                children: RwLock::new(Vec::new()),
                label: ROOT_LABEL,
            }),
        }
    }

    /// Cut a child token for `worker`, the name under which the agent
    /// supervises it (spec.md §4.8 worker liveness checks use the same
    /// name). When the parent is cancelled, every child is cancelled too,
    /// so a deadline or `CANCEL_PILOT` on the root tears down the whole
    /// worker pool without the caller tracking each child individually.
    pub fn child_token(&self, worker: &'static str) -> Self {
        let child = Self {
            inner: Arc::new(CancelTokenInner {
                cancelled: RwLock::new(false),
                notify: Notify::new(),
                parent: Some(self.clone()),
                children: RwLock::new(Vec::new()),
                label: worker,
            }),
        };

        self.inner.children.write().push(child.clone());
        child
    }

    /// The worker name this token was cut for, or `"root"`.
    pub fn label(&self) -> &'static str {
        self.inner.label
    }

    /// Cancel this token and all children
    pub fn cancel(&self) {
        // Mark as cancelled
        *self.inner.cancelled.write() = true;
        tracing::debug!(worker = self.inner.label, "cancel token triggered");

        // Notify all waiters
        self.inner.notify.notify_waiters();

        // Cancel all children
        let children = self.inner.children.read().clone();
        for child in children {
            child.cancel();
        }
    }

    /// Check if this token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        // Check self
        if *self.inner.cancelled.read() {
            return true;
        }

        // Check parent recursively
        if let Some(parent) = &self.inner.parent {
            return parent.is_cancelled();
        }

        false
    }

    /// Wait for this token to be cancelled
    ///
    /// Returns immediately if already cancelled.
    pub async fn cancelled(&self) {
        // Fast path: already cancelled
        if self.is_cancelled() {
            return;
        }

        // Wait for notification
        let notified = self.inner.notify.notified();

        // Check again after getting notified future (race condition)
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

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_cancel_token_basic() {
        let token = CancelToken::new();

        assert!(!token.is_cancelled());

        token.cancel();

        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_token_child() {
        let parent = CancelToken::new();
        let child = parent.child_token("watcher");

        assert!(!parent.is_cancelled());
        assert!(!child.is_cancelled());
        assert_eq!(child.label(), "watcher");

        parent.cancel();

        assert!(parent.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_token_wait() {
        let token = CancelToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token_clone.cancel();
        });

        timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("Should be cancelled");
    }

    #[tokio::test]
    async fn root_token_is_labeled_root() {
        assert_eq!(CancelToken::new().label(), ROOT_LABEL);
    }
}
