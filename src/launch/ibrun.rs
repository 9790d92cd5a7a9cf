//! TACC `ibrun` launch method: offset is the first core index of the slot.

use super::{executable_line, find_on_path, LaunchCommand, LaunchMethod};
use crate::error::{AgentError, AgentResult};
use crate::model::{OpaqueSlot, UnitDescription};
use std::path::PathBuf;

pub struct Ibrun {
    binary: PathBuf,
}

impl Ibrun {
    pub fn new() -> AgentResult<Self> {
        Ok(Self { binary: find_on_path("ibrun")? })
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self { binary: PathBuf::from("/usr/bin/ibrun") }
    }
}

impl LaunchMethod for Ibrun {
    fn name(&self) -> &'static str {
        "ibrun"
    }

    fn render(&self, unit: &UnitDescription, slot: &OpaqueSlot, _script_path: &str) -> AgentResult<LaunchCommand> {
        let OpaqueSlot::Continuous(slots) = slot else {
            return Err(AgentError::Internal("ibrun given a torus slot".to_string()));
        };
        let first = slots.first().ok_or_else(|| AgentError::Internal("ibrun given an empty slot".to_string()))?;
        let (_, core_str) = first
            .split_once(':')
            .ok_or_else(|| AgentError::Internal(format!("malformed slot entry: {first}")))?;
        let offset: u32 = core_str
            .parse()
            .map_err(|_| AgentError::Internal(format!("non-numeric core offset in slot: {first}")))?;
        Ok(LaunchCommand {
            command: format!("{} -n {} -o {} {}", self.binary.display(), unit.cores, offset, executable_line(unit)),
            hop_cmd: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_first_slot_core_index() {
        let mut unit = UnitDescription::default();
        unit.cores = 2;
        unit.executable = "/usr/bin/prog".into();
        let slot = OpaqueSlot::Continuous(vec!["n0:4".into(), "n0:5".into()]);
        let cmd = Ibrun::for_test().render(&unit, &slot, "script.sh").unwrap();
        assert_eq!(cmd.command, "/usr/bin/ibrun -n 2 -o 4 /usr/bin/prog");
    }
}
