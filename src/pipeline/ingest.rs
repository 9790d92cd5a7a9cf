//! Ingest loop: claims pending units from the store and routes each one
//! into StageIn (if it has input directives) or straight to the
//! scheduler (spec.md §2, §6).

use crate::concurrency::CancelToken;
use crate::config::{CloneDropStage, CloneFactor};
use crate::execution::queue::{push_cu, QueueSender};
use crate::model::ComputeUnit;
use crate::scheduler::AnyScheduler;
use crate::store::UnitSource;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(
    source: Arc<dyn UnitSource>,
    stage_in_tx: QueueSender<ComputeUnit>,
    scheduler: Arc<AnyScheduler>,
    clone_factor: CloneFactor,
    poll_interval: Duration,
    cancel: CancelToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("ingest loop stopping on cancel");
                let _ = stage_in_tx.shutdown();
                return;
            }
            claimed = source.claim_pending() => {
                match claimed {
                    Ok(units) => {
                        for cu in units {
                            route(cu, &stage_in_tx, &scheduler, &clone_factor).await;
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "failed to claim pending units"),
                }
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

async fn route(cu: ComputeUnit, stage_in_tx: &QueueSender<ComputeUnit>, scheduler: &Arc<AnyScheduler>, clone_factor: &CloneFactor) {
    if cu.agent_input_directives.is_empty() {
        if let Err(err) = scheduler.schedule(cu).await {
            tracing::error!(error = %err, "schedule failed at ingest");
        }
    } else if let Err(err) = push_cu(stage_in_tx, cu, clone_factor, CloneDropStage::StageIn) {
        tracing::error!(error = %err, "stage-in push failed at ingest");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::queue::channel;
    use crate::model::{ComputeUnit, Directive, DirectiveAction, UnitDescription};
    use crate::scheduler::ContinuousScheduler;
    use crate::store::MockStore;

    #[tokio::test]
    async fn units_without_directives_go_straight_to_the_scheduler() {
        let (exec_tx, mut exec_rx) = channel::<ComputeUnit>();
        let scheduler = Arc::new(AnyScheduler::Continuous(ContinuousScheduler::new(&["n0".into()], 2, exec_tx)));
        let (stage_tx, mut stage_rx) = channel::<ComputeUnit>();
        let source: Arc<dyn UnitSource> = Arc::new(MockStore::new(vec![ComputeUnit::new("u1", UnitDescription::default())]));
        let cancel = CancelToken::new();

        let scheduler2 = scheduler.clone();
        let cancel2 = cancel.clone();
        let handle = tokio::spawn(run(source, stage_tx, scheduler2, CloneFactor::default(), Duration::from_millis(5), cancel2));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let _ = handle.await;

        assert!(stage_rx.try_get().is_none());
        assert!(exec_rx.try_get().is_some());
    }

    #[tokio::test]
    async fn units_with_input_directives_go_to_stage_in() {
        let (exec_tx, _exec_rx) = channel::<ComputeUnit>();
        let scheduler = Arc::new(AnyScheduler::Continuous(ContinuousScheduler::new(&["n0".into()], 2, exec_tx)));
        let (stage_tx, mut stage_rx) = channel::<ComputeUnit>();
        let mut cu = ComputeUnit::new("u1", UnitDescription::default());
        cu.agent_input_directives.push(Directive::new("a", "b", DirectiveAction::Link));
        let source: Arc<dyn UnitSource> = Arc::new(MockStore::new(vec![cu]));
        let cancel = CancelToken::new();

        let cancel2 = cancel.clone();
        let handle = tokio::spawn(run(source, stage_tx, scheduler, CloneFactor::default(), Duration::from_millis(5), cancel2));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let _ = handle.await;

        assert!(stage_rx.try_get().is_some());
    }
}
