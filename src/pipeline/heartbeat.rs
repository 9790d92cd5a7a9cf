//! Heartbeat monitor: the agent's clock. Drains the pilot's external
//! command queue, enforces the wall-clock runtime deadline, and watches
//! worker liveness (spec.md §4.8, §6).

use crate::concurrency::CancelToken;
use crate::model::{PilotState, Uid};
use crate::store::{Command, UpdateSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// A named worker task whose liveness the heartbeat checks every cycle.
pub struct Supervised {
    pub name: &'static str,
    pub handle: JoinHandle<()>,
}

pub async fn run(
    sink: Arc<dyn UpdateSink>,
    cancel_unit_tx: UnboundedSender<Uid>,
    root_cancel: CancelToken,
    start_time: chrono::DateTime<chrono::Utc>,
    deadline: chrono::DateTime<chrono::Utc>,
    interval: Duration,
    workers: Vec<Supervised>,
) {
    let _ = start_time;
    loop {
        if root_cancel.is_cancelled() {
            return;
        }

        match sink.take_pilot_commands().await {
            Ok(commands) => {
                for command in commands {
                    match command {
                        Command::CancelPilot => {
                            tracing::info!("CANCEL_PILOT observed, stopping agent");
                            let _ = sink.mark_pilot_state(PilotState::Canceled, Some("canceled by command".into())).await;
                            root_cancel.cancel();
                            return;
                        }
                        Command::CancelComputeUnit(uid) => {
                            let _ = cancel_unit_tx.send(uid);
                        }
                        Command::KeepAlive => {
                            tracing::debug!("keep-alive received");
                        }
                        Command::Unknown(raw) => {
                            tracing::warn!(command = %raw, "unrecognized pilot command ignored");
                        }
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to read pilot commands"),
        }

        let dead: Vec<&'static str> = workers.iter().filter(|w| w.handle.is_finished()).map(|w| w.name).collect();
        if !dead.is_empty() {
            tracing::error!(workers = ?dead, "worker(s) died, failing pilot");
            let _ = sink
                .mark_pilot_state(PilotState::Failed, Some(format!("workers died: {}", dead.join(", "))))
                .await;
            root_cancel.cancel();
            return;
        }

        if chrono::Utc::now() >= deadline {
            tracing::info!("runtime deadline reached, stopping agent");
            let _ = sink.mark_pilot_state(PilotState::Done, Some("runtime exhausted".into())).await;
            root_cancel.cancel();
            return;
        }

        tokio::select! {
            _ = root_cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
