//! Exec worker: renders a unit's launch script, reverses any active
//! virtualenv mutation, spawns the process, and hands it to the Watcher
//! (spec.md §4.5).

use crate::concurrency::CancelToken;
use crate::error::{AgentError, AgentResult};
use crate::execution::queue::{QueueReceiver, QueueSender};
use crate::launch::LaunchMethod;
use crate::model::ComputeUnit;
use crate::quoting::render_argv;
use crate::store::UpdateRequest;
use std::sync::Arc;

/// A unit handed to the Watcher together with its live process handle.
pub struct SpawnedUnit {
    pub cu: ComputeUnit,
    pub child: tokio::process::Child,
}

/// Variables a Python-style `deactivate` restores when a virtualenv was
/// active in the agent's own process environment (spec.md §4.5 step 1).
const VENV_MARKER: &str = "VIRTUAL_ENV";
const RESTORABLE: [(&str, &str); 3] = [("PATH", "_OLD_VIRTUAL_PATH"), ("PYTHONHOME", "_OLD_VIRTUAL_PYTHONHOME"), ("PS1", "_OLD_VIRTUAL_PS1")];

/// The overrides a unit's launch script must apply on top of its
/// inherited environment to reverse an active virtualenv in the
/// agent's own process: `Some(value)` to export, `None` to unset.
/// Empty when no virtualenv is active.
pub fn venv_reversal() -> Vec<(&'static str, Option<String>)> {
    if std::env::var_os(VENV_MARKER).is_none() {
        return Vec::new();
    }
    RESTORABLE.iter().map(|(live, saved)| (*live, std::env::var(saved).ok())).collect()
}

/// Render the shell launch script: shebang, cd, pre-exec, environment
/// exports, the launch-method command line, post-exec.
pub fn render_script(cu: &ComputeUnit, command: &str, venv_overrides: &[(&'static str, Option<String>)]) -> String {
    let mut script = String::from("#!/bin/sh\n");
    script.push_str(&format!("cd {} || exit 6\n", cu.workdir));
    for line in &cu.description.pre_exec {
        script.push_str(line);
        script.push('\n');
    }
    for (k, v) in venv_overrides {
        match v {
            Some(value) => script.push_str(&format!("export {}={}\n", k, render_argv(std::slice::from_ref(value)))),
            None => script.push_str(&format!("unset {k}\n")),
        }
    }
    for (k, v) in &cu.description.environment {
        script.push_str(&format!("export {}={}\n", k, render_argv(std::slice::from_ref(v))));
    }
    script.push_str(command);
    script.push('\n');
    for line in &cu.description.post_exec {
        script.push_str(line);
        script.push('\n');
    }
    script
}

fn script_path(cu: &ComputeUnit) -> String {
    format!("{}/launch_script.sh", cu.workdir)
}

fn resolve_output_path(workdir: &str, file: &str) -> std::path::PathBuf {
    let path = std::path::Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::path::Path::new(workdir).join(file)
    }
}

async fn spawn_one(cu: &mut ComputeUnit, launch: &dyn LaunchMethod) -> AgentResult<tokio::process::Child> {
    std::fs::create_dir_all(&cu.workdir).map_err(|e| AgentError::Spawn { uid: cu.uid.clone(), reason: e.to_string() })?;

    let slot = cu.opaque_slot.as_ref().ok_or_else(|| AgentError::Spawn { uid: cu.uid.clone(), reason: "no slot allocated".into() })?;
    let rendered = launch
        .render(&cu.description, slot, &script_path(cu))
        .map_err(|e| AgentError::Spawn { uid: cu.uid.clone(), reason: e.to_string() })?;

    let overrides = venv_reversal();
    let script = render_script(cu, &rendered.command, &overrides);
    std::fs::write(script_path(cu), script).map_err(|e| AgentError::Spawn { uid: cu.uid.clone(), reason: e.to_string() })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(script_path(cu)).map_err(AgentError::from)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(script_path(cu), perms).map_err(AgentError::from)?;
    }

    let stdout_path = resolve_output_path(&cu.workdir, &cu.stdout_file);
    let stderr_path = resolve_output_path(&cu.workdir, &cu.stderr_file);
    let stdout = std::fs::OpenOptions::new().create(true).append(true).open(&stdout_path).map_err(AgentError::from)?;
    let stderr = std::fs::OpenOptions::new().create(true).append(true).open(&stderr_path).map_err(AgentError::from)?;

    let invocation = rendered.hop_cmd.unwrap_or_else(|| format!("sh {}", script_path(cu)));
    cu.started = Some(chrono::Utc::now());

    let mut command = tokio::process::Command::new("sh");
    command
        .arg("-c")
        .arg(invocation)
        .current_dir(&cu.workdir)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::from(stdout))
        .stderr(std::process::Stdio::from(stderr));

    command.spawn().map_err(|e| AgentError::Spawn { uid: cu.uid.clone(), reason: e.to_string() })
}

pub async fn run(
    mut exec_rx: QueueReceiver<ComputeUnit>,
    watch_tx: QueueSender<SpawnedUnit>,
    launch: Arc<dyn LaunchMethod>,
    update_tx: QueueSender<UpdateRequest>,
    cancel: CancelToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = watch_tx.shutdown();
                return;
            }
            item = exec_rx.get() => {
                let Some(mut cu) = item else {
                    let _ = watch_tx.shutdown();
                    return;
                };
                match spawn_one(&mut cu, launch.as_ref()).await {
                    Ok(child) => {
                        cu.pid = child.id();
                        let announced = cu.advance_to(crate::model::UnitState::AgentExecuting);
                        if !announced.is_empty() {
                            let _ = update_tx.push(UpdateRequest { uid: cu.uid.clone(), unit: cu.clone(), message: None });
                        }
                        let _ = watch_tx.push(SpawnedUnit { cu, child });
                    }
                    Err(err) => {
                        tracing::error!(error = %err, uid = %cu.uid, "spawn failed");
                        cu.append_log(err.to_string());
                        cu.advance_to(crate::model::UnitState::Failed);
                        let _ = update_tx.push(UpdateRequest { uid: cu.uid.clone(), unit: cu, message: Some(err.to_string()) });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnitDescription;

    #[test]
    fn render_script_embeds_pre_exec_env_and_command() {
        let mut desc = UnitDescription::default();
        desc.pre_exec = vec!["module load foo".to_string()];
        desc.post_exec = vec!["echo done".to_string()];
        let cu = ComputeUnit::new("u1", desc);
        let script = render_script(&cu, "/bin/echo \"hi\"", &[]);
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("module load foo"));
        assert!(script.contains("/bin/echo \"hi\""));
        assert!(script.contains("echo done"));
    }

    #[test]
    fn venv_reversal_is_empty_without_an_active_virtualenv() {
        std::env::remove_var("VIRTUAL_ENV");
        assert!(venv_reversal().is_empty());
    }

    #[test]
    #[ignore = "mutates process-global env vars; run with --test-threads=1"]
    fn venv_reversal_restores_the_saved_path() {
        std::env::set_var("VIRTUAL_ENV", "/opt/venv");
        std::env::set_var("_OLD_VIRTUAL_PATH", "/usr/bin");
        let overrides = venv_reversal();
        assert!(overrides.contains(&("PATH", Some("/usr/bin".to_string()))));
        std::env::remove_var("VIRTUAL_ENV");
        std::env::remove_var("_OLD_VIRTUAL_PATH");
    }
}
