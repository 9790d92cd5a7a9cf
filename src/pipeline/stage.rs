//! StageIn / StageOut workers: process every directive in order, applying
//! LINK/COPY/MOVE/TRANSFER semantics against a shared staging area
//! (spec.md §4.6).

use crate::concurrency::CancelToken;
use crate::error::{AgentError, AgentResult};
use crate::execution::queue::{QueueReceiver, QueueSender};
use crate::model::{ComputeUnit, Directive, DirectiveAction, DirectiveState};
use crate::scheduler::AnyScheduler;
use crate::store::UpdateRequest;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolve a `staging://`-scheme path against the shared staging area, or
/// take it as-is otherwise.
pub fn resolve_path(staging_area: &Path, raw: &str) -> PathBuf {
    match raw.strip_prefix("staging://") {
        Some(rest) => staging_area.join(rest),
        None => PathBuf::from(raw),
    }
}

fn apply_directive(staging_area: &Path, directive: &Directive) -> AgentResult<()> {
    let source = resolve_path(staging_area, &directive.source);
    let target = resolve_path(staging_area, &directive.target);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AgentError::Staging { uid: String::new(), src_path: source.display().to_string(), target: target.display().to_string(), reason: e.to_string() })?;
    }
    let result = match directive.action {
        DirectiveAction::Link => std::os::unix::fs::symlink(&source, &target).map_err(|e| e.to_string()),
        DirectiveAction::Copy => std::fs::copy(&source, &target).map(|_| ()).map_err(|e| e.to_string()),
        DirectiveAction::Move => std::fs::rename(&source, &target).map_err(|e| e.to_string()),
        DirectiveAction::Transfer => Err("TRANSFER is delegated to the external file-transfer worker; the agent does not implement it".to_string()),
    };
    result.map_err(|reason| AgentError::Staging {
        uid: String::new(),
        src_path: source.display().to_string(),
        target: target.display().to_string(),
        reason,
    })
}

/// Process every directive in `directives`, stopping at the first
/// failure. Returns `Ok(())` if all succeeded.
fn process_all(staging_area: &Path, directives: &mut [Directive], uid: &str) -> AgentResult<()> {
    for directive in directives.iter_mut() {
        match apply_directive(staging_area, directive) {
            Ok(()) => directive.state = DirectiveState::Done,
            Err(err) => {
                directive.state = DirectiveState::Failed;
                return Err(err.with_uid(uid));
            }
        }
    }
    Ok(())
}

pub async fn run_stage_in(
    mut rx: QueueReceiver<ComputeUnit>,
    scheduler: Arc<AnyScheduler>,
    update_tx: QueueSender<UpdateRequest>,
    staging_area: PathBuf,
    cancel: CancelToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            item = rx.get() => {
                let Some(mut cu) = item else { return };
                let uid = cu.uid.clone();
                match process_all(&staging_area, &mut cu.agent_input_directives, &uid) {
                    Ok(()) => {
                        if let Err(err) = scheduler.schedule(cu).await {
                            tracing::error!(error = %err, uid, "schedule failed after stage-in");
                        }
                    }
                    Err(err) => {
                        cu.append_log(err.to_string());
                        cu.advance_to(crate::model::UnitState::Failed);
                        let _ = update_tx.push(UpdateRequest { uid: uid.clone(), unit: cu, message: Some(err.to_string()) });
                    }
                }
            }
        }
    }
}

pub async fn run_stage_out(
    mut rx: QueueReceiver<ComputeUnit>,
    update_tx: QueueSender<UpdateRequest>,
    staging_area: PathBuf,
    cancel: CancelToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            item = rx.get() => {
                let Some(mut cu) = item else { return };
                let uid = cu.uid.clone();
                let outcome = process_all(&staging_area, &mut cu.agent_output_directives, &uid);
                cu.truncate_output();
                let message = match outcome {
                    Ok(()) => {
                        if cu.has_pending_ftw_directives() {
                            None
                        } else {
                            cu.advance_to(crate::model::UnitState::Done);
                            None
                        }
                    }
                    Err(err) => {
                        cu.append_log(err.to_string());
                        cu.advance_to(crate::model::UnitState::Failed);
                        Some(err.to_string())
                    }
                };
                let _ = update_tx.push(UpdateRequest { uid, unit: cu, message });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::queue::channel;
    use crate::model::UnitDescription;
    use crate::scheduler::ContinuousScheduler;
    use tempfile::tempdir;

    #[tokio::test]
    async fn stage_in_failure_fails_the_unit_without_scheduling() {
        let dir = tempdir().unwrap();
        let (tx, rx) = channel::<ComputeUnit>();
        let (update_tx, mut update_rx) = channel::<UpdateRequest>();
        let (exec_tx, mut exec_rx) = channel::<ComputeUnit>();
        let scheduler = Arc::new(AnyScheduler::Continuous(ContinuousScheduler::new(&["n0".into()], 2, exec_tx)));
        let cancel = CancelToken::new();

        let mut cu = ComputeUnit::new("u1", UnitDescription::default());
        cu.agent_input_directives.push(Directive::new("/no/such/file", "in.txt", DirectiveAction::Link));
        tx.push(cu).unwrap();
        tx.shutdown().unwrap();

        run_stage_in(rx, scheduler, update_tx, dir.path().to_path_buf(), cancel).await;

        assert!(exec_rx.try_get().is_none());
        let update = update_rx.try_get().expect("failure update emitted");
        assert_eq!(update.unit.state, crate::model::UnitState::Failed);
    }

    #[tokio::test]
    async fn stage_in_link_success_schedules_the_unit() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("in.txt"), b"hi").unwrap();
        let (tx, rx) = channel::<ComputeUnit>();
        let (update_tx, _update_rx) = channel::<UpdateRequest>();
        let (exec_tx, mut exec_rx) = channel::<ComputeUnit>();
        let scheduler = Arc::new(AnyScheduler::Continuous(ContinuousScheduler::new(&["n0".into()], 2, exec_tx)));
        let cancel = CancelToken::new();

        let mut cu = ComputeUnit::new("u1", UnitDescription::default());
        cu.agent_input_directives.push(Directive::new(
            dir.path().join("in.txt").display().to_string(),
            dir.path().join("linked.txt").display().to_string(),
            DirectiveAction::Link,
        ));
        tx.push(cu).unwrap();
        tx.shutdown().unwrap();

        run_stage_in(rx, scheduler, update_tx, dir.path().to_path_buf(), cancel).await;

        assert!(exec_rx.try_get().is_some());
    }

    #[test]
    fn staging_scheme_resolves_against_the_staging_area() {
        let area = PathBuf::from("/tmp/pilot-staging");
        assert_eq!(resolve_path(&area, "staging://a/b.txt"), area.join("a/b.txt"));
        assert_eq!(resolve_path(&area, "/abs/path"), PathBuf::from("/abs/path"));
    }
}
