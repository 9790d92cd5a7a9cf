//! Update worker: batches per-unit state/log updates and flushes them to
//! the store as a bulk once no new update has arrived for a short
//! window, rather than issuing one store round-trip per update
//! (spec.md §4.7).

use crate::concurrency::CancelToken;
use crate::execution::queue::QueueReceiver;
use crate::store::{UpdateRequest, UpdateSink};
use std::sync::Arc;
use std::time::Duration;

async fn flush(sink: &dyn UpdateSink, pending: &mut Vec<UpdateRequest>) {
    if pending.is_empty() {
        return;
    }
    for request in pending.drain(..) {
        let uid = request.uid.clone();
        if let Err(err) = sink.push(request).await {
            tracing::warn!(error = %err, uid, "store update failed, continuing");
        }
    }
}

pub async fn run(mut rx: QueueReceiver<UpdateRequest>, sink: Arc<dyn UpdateSink>, bulk_collection_time: Duration, cancel: CancelToken) {
    let mut pending = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                flush(sink.as_ref(), &mut pending).await;
                return;
            }
            outcome = tokio::time::timeout(bulk_collection_time, rx.get()) => {
                match outcome {
                    Ok(Some(request)) => pending.push(request),
                    Ok(None) => {
                        flush(sink.as_ref(), &mut pending).await;
                        return;
                    }
                    Err(_elapsed) => flush(sink.as_ref(), &mut pending).await,
                }
            }
        }
    }
}
