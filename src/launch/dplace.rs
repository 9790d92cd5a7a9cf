//! SGI `dplace` launch method: pins the process to the slot's core list.

use super::{executable_line, find_on_path, LaunchCommand, LaunchMethod};
use crate::error::{AgentError, AgentResult};
use crate::model::{OpaqueSlot, UnitDescription};
use std::path::PathBuf;

pub struct Dplace {
    binary: PathBuf,
}

impl Dplace {
    pub fn new() -> AgentResult<Self> {
        Ok(Self { binary: find_on_path("dplace")? })
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self { binary: PathBuf::from("/usr/bin/dplace") }
    }
}

impl LaunchMethod for Dplace {
    fn name(&self) -> &'static str {
        "dplace"
    }

    fn render(&self, unit: &UnitDescription, slot: &OpaqueSlot, _script_path: &str) -> AgentResult<LaunchCommand> {
        let OpaqueSlot::Continuous(slots) = slot else {
            return Err(AgentError::Internal("dplace given a torus slot".to_string()));
        };
        let cores: Vec<&str> = slots
            .iter()
            .filter_map(|s| s.split_once(':').map(|(_, core)| core))
            .collect();
        Ok(LaunchCommand {
            command: format!("{} -c {} {}", self.binary.display(), cores.join(","), executable_line(unit)),
            hop_cmd: None,
        })
    }
}
