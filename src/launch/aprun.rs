//! Cray `aprun` launch method.

use super::{executable_line, find_on_path, LaunchCommand, LaunchMethod};
use crate::error::AgentResult;
use crate::model::{OpaqueSlot, UnitDescription};
use std::path::PathBuf;

pub struct Aprun {
    binary: PathBuf,
}

impl Aprun {
    pub fn new() -> AgentResult<Self> {
        Ok(Self { binary: find_on_path("aprun")? })
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self { binary: PathBuf::from("/usr/bin/aprun") }
    }
}

impl LaunchMethod for Aprun {
    fn name(&self) -> &'static str {
        "aprun"
    }

    fn render(&self, unit: &UnitDescription, _slot: &OpaqueSlot, _script_path: &str) -> AgentResult<LaunchCommand> {
        Ok(LaunchCommand {
            command: format!("{} -n {} {}", self.binary.display(), unit.cores, executable_line(unit)),
            hop_cmd: None,
        })
    }
}
