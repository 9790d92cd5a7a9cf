//! Wires an [`AgentConfig`] into a running pilot agent: probes the LRMS,
//! builds the scheduler and launch method, and spawns the full worker
//! pool under one root cancel token (spec.md §5, §6).
//!
//! Each pipeline queue has exactly one [`crate::execution::queue::QueueReceiver`]
//! owner by construction, so one worker task drains each stage; the
//! configured `WorkerCounts` only multiplies the stages that read from a
//! shared store instead of a single in-process queue (see DESIGN.md).

use crate::concurrency::CancelToken;
use crate::config::{AgentConfig, SchedulerKind};
use crate::error::{AgentError, AgentResult};
use crate::execution::queue::channel;
use crate::launch::aprun::Aprun;
use crate::launch::dplace::Dplace;
use crate::launch::fork::ForkLaunch;
use crate::launch::ibrun::Ibrun;
use crate::launch::mpirun::{Mpirun, MpirunRsh};
use crate::launch::poe::Poe;
use crate::launch::runjob::Runjob;
use crate::launch::ssh::SshLaunch;
use crate::launch::LaunchMethod;
use crate::lrms;
use crate::model::{ComputeUnit, PilotState};
use crate::pipeline::exec::SpawnedUnit;
use crate::pipeline::heartbeat::Supervised;
use crate::pipeline::{exec, heartbeat, ingest, stage, update, watcher};
use crate::scheduler::{ContinuousScheduler, TorusScheduler, AnyScheduler};
use crate::store::{UnitSource, UpdateRequest, UpdateSink};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::unbounded_channel;

/// Build the configured launch method, probing `PATH` for its binary.
fn build_launch_method(name: &str, block_handle: Option<&str>) -> AgentResult<Arc<dyn LaunchMethod>> {
    let method: Arc<dyn LaunchMethod> = match name {
        "ssh" => Arc::new(SshLaunch::new()?),
        "mpirun" => Arc::new(Mpirun::new()?),
        "mpirun_rsh" => Arc::new(MpirunRsh::new()?),
        "aprun" => Arc::new(Aprun::new()?),
        "ibrun" => Arc::new(Ibrun::new()?),
        "runjob" => Arc::new(Runjob::new(block_handle.unwrap_or_default().to_string())?),
        "poe" => Arc::new(Poe::new()?),
        "dplace" => Arc::new(Dplace::new()?),
        "fork" => Arc::new(ForkLaunch::new()?),
        other => return Err(AgentError::Config(format!("unknown launch method: {other}"))),
    };
    Ok(method)
}

/// A fully wired pilot agent, ready to `run()`.
pub struct Agent {
    config: AgentConfig,
    source: Arc<dyn UnitSource>,
    sink: Arc<dyn UpdateSink>,
    staging_area: PathBuf,
}

impl Agent {
    pub fn new(config: AgentConfig, source: Arc<dyn UnitSource>, sink: Arc<dyn UpdateSink>, staging_area: PathBuf) -> AgentResult<Self> {
        config.validate()?;
        Ok(Self { config, source, sink, staging_area })
    }

    /// Run the agent to completion: returns once the Heartbeat monitor
    /// cancels the root token (deadline, `CANCEL_PILOT`, or a dead worker).
    pub async fn run(self) -> AgentResult<()> {
        let start_time = chrono::Utc::now();
        let deadline = self.config.runtime_deadline(start_time);
        let root_cancel = CancelToken::new();

        if self.config.spawner == crate::config::SpawnerKind::ShellSpawner {
            return Err(AgentError::Config(
                "the shell-spawner bulk-launch backend is not implemented; use spawner=direct".into(),
            ));
        }

        let descriptor = lrms::probe(self.config.lrms, self.config.cores)?.validate(self.config.cores)?;

        let launch_name = if self.config.agent_scheduler == SchedulerKind::Torus {
            &self.config.mpi_launch_method
        } else {
            &self.config.task_launch_method
        };
        let launch = build_launch_method(launch_name, descriptor.block_handle.as_deref())?;

        let (exec_tx, exec_rx) = channel::<ComputeUnit>();
        let (stage_in_tx, stage_in_rx) = channel::<ComputeUnit>();
        let (stage_out_tx, stage_out_rx) = channel::<ComputeUnit>();
        let (update_tx, update_rx) = channel::<UpdateRequest>();
        let (watch_tx, watch_rx) = channel::<SpawnedUnit>();
        let (cancel_unit_tx, cancel_unit_rx) = unbounded_channel();

        let scheduler = Arc::new(match self.config.agent_scheduler {
            SchedulerKind::Continuous => {
                AnyScheduler::Continuous(ContinuousScheduler::new(&descriptor.node_list, descriptor.cores_per_node, exec_tx.clone()))
            }
            SchedulerKind::Torus => {
                let block = descriptor
                    .torus_block
                    .clone()
                    .ok_or_else(|| AgentError::Config("torus scheduler selected but LRMS reported no torus block".into()))?;
                let shape_table = descriptor
                    .shape_table
                    .clone()
                    .ok_or_else(|| AgentError::Config("torus scheduler selected but LRMS reported no shape table".into()))?;
                AnyScheduler::Torus(TorusScheduler::new(block, shape_table, descriptor.cores_per_node, exec_tx.clone()))
            }
        });
        drop(exec_tx);

        let mut supervised = Vec::new();

        let ingest_handle = tokio::spawn(ingest::run(
            self.source.clone(),
            stage_in_tx,
            scheduler.clone(),
            self.config.clone_factor,
            self.config.watcher_poll_interval(),
            root_cancel.child_token("ingest"),
        ));
        supervised.push(Supervised { name: "ingest", handle: ingest_handle });

        let stage_in_handle = tokio::spawn(stage::run_stage_in(stage_in_rx, scheduler.clone(), update_tx.clone(), self.staging_area.clone(), root_cancel.child_token("stage-in")));
        supervised.push(Supervised { name: "stage-in", handle: stage_in_handle });

        let stage_out_handle = tokio::spawn(stage::run_stage_out(stage_out_rx, update_tx.clone(), self.staging_area.clone(), root_cancel.child_token("stage-out")));
        supervised.push(Supervised { name: "stage-out", handle: stage_out_handle });

        let exec_handle = tokio::spawn(exec::run(exec_rx, watch_tx, launch, update_tx.clone(), root_cancel.child_token("exec")));
        supervised.push(Supervised { name: "exec", handle: exec_handle });

        let watcher_handle = tokio::spawn(watcher::run(
            watch_rx,
            cancel_unit_rx,
            stage_out_tx,
            scheduler.clone(),
            update_tx.clone(),
            self.config.watcher_poll_interval(),
            root_cancel.child_token("watcher"),
        ));
        supervised.push(Supervised { name: "watcher", handle: watcher_handle });

        let update_handle = tokio::spawn(update::run(update_rx, self.sink.clone(), self.config.bulk_collection_time(), root_cancel.child_token("update")));
        supervised.push(Supervised { name: "update", handle: update_handle });

        let _ = self.sink.mark_pilot_state(PilotState::PmgrActive, None).await;

        heartbeat::run(
            self.sink.clone(),
            cancel_unit_tx,
            root_cancel,
            start_time,
            deadline,
            self.config.heartbeat_interval(),
            supervised,
        )
        .await;

        Ok(())
    }
}
