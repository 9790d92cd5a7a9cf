//! Launch methods: pure formatters from `(executable, args, cores,
//! opaque_slot)` to a shell command line (spec.md §4.2).
//!
//! Construction probes `PATH` for the backend's binary; a missing binary
//! is a `ConfigError` raised once, at startup, rather than per-unit.

pub mod aprun;
pub mod dplace;
pub mod fork;
pub mod ibrun;
pub mod mpirun;
pub mod poe;
pub mod runjob;
pub mod ssh;

use crate::error::{AgentError, AgentResult};
use crate::model::{OpaqueSlot, UnitDescription};
use std::path::PathBuf;

/// A rendered invocation: the command to run, plus an optional "hop"
/// command that re-invokes the launch script on a remote node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub command: String,
    pub hop_cmd: Option<String>,
}

/// `(executable, args, cores, opaque_slot) -> (command, hop_cmd?)`.
pub trait LaunchMethod: Send + Sync {
    fn name(&self) -> &'static str;
    fn render(&self, unit: &UnitDescription, slot: &OpaqueSlot, script_path: &str) -> AgentResult<LaunchCommand>;
}

/// Search `PATH` for `binary`, the way every backend's constructor probes
/// for its launcher before the agent accepts any units.
pub(crate) fn find_on_path(binary: &str) -> AgentResult<PathBuf> {
    let path_var = std::env::var_os("PATH").ok_or_else(|| AgentError::Config("PATH is not set".to_string()))?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(AgentError::Config(format!("launcher binary not found on PATH: {binary}")))
}

/// The quoted `executable arg1 arg2 ...` line every backend embeds in its
/// rendered command (spec.md §4.2 takes `executable`/`args` as direct
/// inputs to the launch method, not just to the enclosing script).
pub(crate) fn executable_line(unit: &UnitDescription) -> String {
    let argv = crate::quoting::render_argv(&unit.arguments);
    if argv.is_empty() {
        unit.executable.clone()
    } else {
        format!("{} {}", unit.executable, argv)
    }
}

pub(crate) fn continuous_hosts(slot: &OpaqueSlot) -> AgentResult<Vec<String>> {
    match slot {
        OpaqueSlot::Continuous(slots) => Ok(slots
            .iter()
            .filter_map(|s| s.split_once(':').map(|(host, _)| host.to_string()))
            .collect()),
        OpaqueSlot::Torus { .. } => Err(AgentError::Internal("continuous launch method given a torus slot".to_string())),
    }
}
