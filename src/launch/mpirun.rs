//! `mpirun` and `mpirun_rsh` launch methods for MPI units.

use super::{continuous_hosts, executable_line, find_on_path, LaunchCommand, LaunchMethod};
use crate::error::AgentResult;
use crate::model::{OpaqueSlot, UnitDescription};
use std::path::PathBuf;

fn unique_in_order(hosts: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    hosts.iter().filter(|h| seen.insert((*h).clone())).cloned().collect()
}

pub struct Mpirun {
    binary: PathBuf,
}

impl Mpirun {
    pub fn new() -> AgentResult<Self> {
        Ok(Self { binary: find_on_path("mpirun")? })
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self { binary: PathBuf::from("/usr/bin/mpirun") }
    }
}

impl LaunchMethod for Mpirun {
    fn name(&self) -> &'static str {
        "mpirun"
    }

    fn render(&self, unit: &UnitDescription, slot: &OpaqueSlot, _script_path: &str) -> AgentResult<LaunchCommand> {
        let hosts = unique_in_order(&continuous_hosts(slot)?);
        Ok(LaunchCommand {
            command: format!(
                "{} -np {} -host {} {}",
                self.binary.display(),
                unit.cores,
                hosts.join(","),
                executable_line(unit)
            ),
            hop_cmd: None,
        })
    }
}

pub struct MpirunRsh {
    binary: PathBuf,
}

impl MpirunRsh {
    pub fn new() -> AgentResult<Self> {
        Ok(Self { binary: find_on_path("mpirun_rsh")? })
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self { binary: PathBuf::from("/usr/bin/mpirun_rsh") }
    }
}

impl LaunchMethod for MpirunRsh {
    fn name(&self) -> &'static str {
        "mpirun_rsh"
    }

    fn render(&self, unit: &UnitDescription, slot: &OpaqueSlot, _script_path: &str) -> AgentResult<LaunchCommand> {
        let hosts = unique_in_order(&continuous_hosts(slot)?);
        Ok(LaunchCommand {
            command: format!(
                "{} -np {} {} {}",
                self.binary.display(),
                unit.cores,
                hosts.join(" "),
                executable_line(unit)
            ),
            hop_cmd: None,
        })
    }
}
