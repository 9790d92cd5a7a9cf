//! Watcher: polls spawned processes to completion or cancellation,
//! releases scheduler slots, and routes finished units into StageOut
//! (spec.md §4.5).

use crate::concurrency::CancelToken;
use crate::error::AgentError;
use crate::execution::queue::{QueueReceiver, QueueSender};
use crate::model::{ComputeUnit, Uid, UnitState};
use crate::pipeline::exec::SpawnedUnit;
use crate::scheduler::AnyScheduler;
use crate::store::UpdateRequest;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on new units folded into the watch set per poll cycle,
/// so one flood of spawns can't starve units already being watched.
const MAX_NEW_PER_CYCLE: usize = 100;

struct Watched {
    cu: ComputeUnit,
    child: tokio::process::Child,
}

pub async fn run(
    mut spawned_rx: QueueReceiver<SpawnedUnit>,
    mut cancel_rx: tokio::sync::mpsc::UnboundedReceiver<Uid>,
    stage_out_tx: QueueSender<ComputeUnit>,
    scheduler: Arc<AnyScheduler>,
    update_tx: QueueSender<UpdateRequest>,
    poll_interval: Duration,
    cancel: CancelToken,
) {
    let mut watched: HashMap<Uid, Watched> = HashMap::new();
    let mut cancel_requested: std::collections::HashSet<Uid> = std::collections::HashSet::new();

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let mut took_any = false;
        for _ in 0..MAX_NEW_PER_CYCLE {
            match spawned_rx.try_get() {
                Some(SpawnedUnit { cu, child }) => {
                    took_any = true;
                    watched.insert(cu.uid.clone(), Watched { cu, child });
                }
                None => break,
            }
        }
        while let Ok(uid) = cancel_rx.try_recv() {
            cancel_requested.insert(uid);
        }

        let uids: Vec<Uid> = watched.keys().cloned().collect();
        for uid in uids {
            let cancel_now = cancel_requested.remove(&uid);
            let Some(entry) = watched.get_mut(&uid) else { continue };

            if cancel_now {
                let _ = entry.child.start_kill();
            }

            match entry.child.try_wait() {
                Ok(Some(status)) => {
                    let mut entry = watched.remove(&uid).unwrap();
                    let _ = scheduler.unschedule(&entry.cu).await;
                    entry.cu.finished = Some(chrono::Utc::now());
                    entry.cu.exit_code = status.code();
                    if cancel_now {
                        entry.cu.advance_to(UnitState::Canceled);
                        let _ = update_tx.push(UpdateRequest { uid: entry.cu.uid.clone(), unit: entry.cu, message: Some("canceled".into()) });
                    } else if status.success() {
                        entry.cu.advance_to(UnitState::AgentStagingOutput);
                        let _ = stage_out_tx.push(entry.cu);
                    } else {
                        let code = status.code().unwrap_or(-1);
                        let err = AgentError::UnitExecution { uid: entry.cu.uid.clone(), exit_code: code };
                        entry.cu.append_log(err.to_string());
                        entry.cu.advance_to(UnitState::Failed);
                        let _ = update_tx.push(UpdateRequest { uid: entry.cu.uid.clone(), unit: entry.cu, message: Some(err.to_string()) });
                    }
                }
                Ok(None) => {
                    if cancel_now {
                        // killed but not yet reaped; re-flag so next cycle reaps it as canceled
                        cancel_requested.insert(uid);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, uid, "try_wait failed");
                }
            }
        }

        if !took_any && watched.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        } else {
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::queue::channel;
    use crate::model::UnitDescription;
    use crate::scheduler::ContinuousScheduler;
    use tokio::sync::mpsc::unbounded_channel;

    fn spawn_sleep(secs: &str) -> tokio::process::Child {
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(format!("sleep {secs}"))
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn successful_exit_routes_to_stage_out_and_releases_slot() {
        let (exec_tx, _exec_rx) = channel::<ComputeUnit>();
        let scheduler = Arc::new(AnyScheduler::Continuous(ContinuousScheduler::new(&["n0".into()], 2, exec_tx)));
        scheduler.schedule(ComputeUnit::new("u1", UnitDescription::default())).await.unwrap();

        let (spawned_tx, spawned_rx) = channel::<SpawnedUnit>();
        let (_cancel_tx, cancel_rx) = unbounded_channel();
        let (stage_out_tx, mut stage_out_rx) = channel::<ComputeUnit>();
        let (update_tx, _update_rx) = channel::<UpdateRequest>();
        let cancel = CancelToken::new();

        let mut cu = ComputeUnit::new("u1", UnitDescription::default());
        cu.opaque_slot = Some(crate::model::OpaqueSlot::Continuous(vec!["n0:0".into()]));
        let child = tokio::process::Command::new("true").spawn().unwrap();
        spawned_tx.push(SpawnedUnit { cu, child }).unwrap();

        let cancel2 = cancel.clone();
        let handle = tokio::spawn(run(spawned_rx, cancel_rx, stage_out_tx, scheduler.clone(), update_tx, Duration::from_millis(50), cancel2));
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        let _ = handle.await;

        let done = stage_out_rx.try_get().expect("unit routed to stage-out");
        assert_eq!(done.state, UnitState::AgentStagingOutput);
        assert!(scheduler.all_free().await);
    }

    #[tokio::test]
    async fn cancel_kills_the_process_and_marks_canceled() {
        let (exec_tx, _exec_rx) = channel::<ComputeUnit>();
        let scheduler = Arc::new(AnyScheduler::Continuous(ContinuousScheduler::new(&["n0".into()], 2, exec_tx)));

        let (spawned_tx, spawned_rx) = channel::<SpawnedUnit>();
        let (cancel_tx, cancel_rx) = unbounded_channel();
        let (stage_out_tx, _stage_out_rx) = channel::<ComputeUnit>();
        let (update_tx, mut update_rx) = channel::<UpdateRequest>();
        let cancel = CancelToken::new();

        let mut cu = ComputeUnit::new("u1", UnitDescription::default());
        cu.opaque_slot = Some(crate::model::OpaqueSlot::Continuous(vec!["n0:0".into()]));
        let child = spawn_sleep("30");
        spawned_tx.push(SpawnedUnit { cu, child }).unwrap();
        cancel_tx.send("u1".to_string()).unwrap();

        let cancel2 = cancel.clone();
        let handle = tokio::spawn(run(spawned_rx, cancel_rx, stage_out_tx, scheduler, update_tx, Duration::from_millis(50), cancel2));
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
        let _ = handle.await;

        let update = update_rx.try_get().expect("cancel update emitted");
        assert_eq!(update.unit.state, UnitState::Canceled);
    }
}
