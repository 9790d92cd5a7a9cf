//! Generic typed FIFO queue used for every hand-off between pipeline
//! stages (spec.md §3 "Queue"). Non-blocking `try_get` and blocking
//! `get`, with an explicit shutdown sentinel rather than relying on
//! queue-empty exceptions as a control-flow signal (design notes §9).

use crate::config::{CloneDropStage, CloneFactor};
use crate::error::{AgentError, AgentResult};
use crate::model::ComputeUnit;
use tokio::sync::mpsc;

/// Either a real item or the shutdown sentinel.
enum Message<T> {
    Item(T),
    Shutdown,
}

/// The sending half of a queue.
pub struct QueueSender<T> {
    tx: mpsc::UnboundedSender<Message<T>>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

/// The receiving half of a queue. Not `Clone`: exactly one owner drains
/// it, matching the "CU owned by exactly one component" invariant.
pub struct QueueReceiver<T> {
    rx: mpsc::UnboundedReceiver<Message<T>>,
}

/// Create a fresh queue.
pub fn channel<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueSender { tx }, QueueReceiver { rx })
}

impl<T> QueueSender<T> {
    /// Enqueue an item. FIFO order is preserved for all senders sharing
    /// this channel.
    pub fn push(&self, item: T) -> AgentResult<()> {
        self.tx
            .send(Message::Item(item))
            .map_err(|_| AgentError::Internal("queue receiver dropped".into()))
    }

    /// Signal shutdown: the receiver's `get()` returns `None` once the
    /// sentinel is drained, after any items enqueued before it.
    pub fn shutdown(&self) -> AgentResult<()> {
        self.tx
            .send(Message::Shutdown)
            .map_err(|_| AgentError::Internal("queue receiver dropped".into()))
    }
}

impl<T> QueueReceiver<T> {
    /// Block until an item arrives, the sentinel is seen, or every
    /// sender has been dropped.
    pub async fn get(&mut self) -> Option<T> {
        match self.rx.recv().await {
            Some(Message::Item(item)) => Some(item),
            Some(Message::Shutdown) | None => None,
        }
    }

    /// Non-blocking poll. Returns `None` on empty, shutdown, or closed —
    /// callers that need to distinguish "empty" from "shut down" should
    /// use `get()` in a loop instead.
    pub fn try_get(&mut self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(Message::Item(item)) => Some(item),
            Ok(Message::Shutdown) | Err(_) => None,
        }
    }
}

/// Push a compute unit onto a queue, applying the load-testing
/// clone/blowup knob of design notes §9. A no-op when
/// `clone_factor.factor <= 1`. The original CU with the canonical uid
/// always survives; clones are fanned out alongside it and dropped
/// again once the pipeline reaches `clone_factor.drop_at`.
pub fn push_cu(
    sender: &QueueSender<ComputeUnit>,
    cu: ComputeUnit,
    clone_factor: &CloneFactor,
    stage: CloneDropStage,
) -> AgentResult<()> {
    if clone_factor.factor <= 1 || cu.is_clone() {
        if stage == clone_factor.drop_at && cu.is_clone() {
            return Ok(());
        }
        return sender.push(cu);
    }

    if stage == clone_factor.drop_at {
        return sender.push(cu);
    }

    for i in 1..clone_factor.factor {
        sender.push(cu.clone_for_load_test(i))?;
    }
    sender.push(cu)
}
