//! IBM POE launch method.

use super::{executable_line, find_on_path, LaunchCommand, LaunchMethod};
use crate::error::AgentResult;
use crate::model::{OpaqueSlot, UnitDescription};
use std::path::PathBuf;

pub struct Poe {
    binary: PathBuf,
}

impl Poe {
    pub fn new() -> AgentResult<Self> {
        Ok(Self { binary: find_on_path("poe")? })
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self { binary: PathBuf::from("/usr/bin/poe") }
    }
}

impl LaunchMethod for Poe {
    fn name(&self) -> &'static str {
        "poe"
    }

    fn render(&self, unit: &UnitDescription, _slot: &OpaqueSlot, _script_path: &str) -> AgentResult<LaunchCommand> {
        Ok(LaunchCommand {
            command: format!("{} {} -procs {}", self.binary.display(), executable_line(unit), unit.cores),
            hop_cmd: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poe_wraps_the_executable() {
        let mut unit = UnitDescription::default();
        unit.cores = 4;
        unit.executable = "/usr/bin/prog".into();
        let slot = OpaqueSlot::Continuous(vec!["n0:0".into()]);
        let cmd = Poe::for_test().render(&unit, &slot, "script.sh").unwrap();
        assert_eq!(cmd.command, "/usr/bin/poe /usr/bin/prog -procs 4");
    }
}
