//! BG/Q `runjob` launch method: the only backend driven by a torus slot.

use super::{executable_line, find_on_path, LaunchCommand, LaunchMethod};
use crate::error::{AgentError, AgentResult};
use crate::model::{OpaqueSlot, UnitDescription};
use std::path::PathBuf;

pub struct Runjob {
    binary: PathBuf,
    block_handle: String,
}

impl Runjob {
    pub fn new(block_handle: impl Into<String>) -> AgentResult<Self> {
        Ok(Self { binary: find_on_path("runjob")?, block_handle: block_handle.into() })
    }

    #[cfg(test)]
    pub(crate) fn for_test(block_handle: impl Into<String>) -> Self {
        Self { binary: PathBuf::from("/usr/bin/runjob"), block_handle: block_handle.into() }
    }
}

impl LaunchMethod for Runjob {
    fn name(&self) -> &'static str {
        "runjob"
    }

    fn render(&self, unit: &UnitDescription, slot: &OpaqueSlot, _script_path: &str) -> AgentResult<LaunchCommand> {
        let OpaqueSlot::Torus { corner, shape } = slot else {
            return Err(AgentError::Internal("runjob given a continuous slot".to_string()));
        };
        let corner_str = format!("{},{},{},{},{}", corner.a, corner.b, corner.c, corner.d, corner.e);
        let shape_str = format!("{}x{}x{}x{}x{}", shape.a, shape.b, shape.c, shape.d, shape.e);
        Ok(LaunchCommand {
            command: format!(
                "{} --corner {} --shape {} --block {} --np {} : {}",
                self.binary.display(),
                corner_str,
                shape_str,
                self.block_handle,
                unit.cores,
                executable_line(unit)
            ),
            hop_cmd: None,
        })
    }
}
