//! Fork launch method: run the executable directly, no remote hop.

use super::{executable_line, find_on_path, LaunchCommand, LaunchMethod};
use crate::error::AgentResult;
use crate::model::{OpaqueSlot, UnitDescription};
use std::path::PathBuf;

pub struct ForkLaunch {
    shell: PathBuf,
}

impl ForkLaunch {
    pub fn new() -> AgentResult<Self> {
        Ok(Self { shell: find_on_path("sh")? })
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self { shell: PathBuf::from("/bin/sh") }
    }
}

impl LaunchMethod for ForkLaunch {
    fn name(&self) -> &'static str {
        "fork"
    }

    fn render(&self, unit: &UnitDescription, _slot: &OpaqueSlot, _script_path: &str) -> AgentResult<LaunchCommand> {
        let _ = &self.shell; // the shell wraps the whole script, not this line
        Ok(LaunchCommand { command: executable_line(unit), hop_cmd: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_the_bare_executable_line() {
        let mut unit = UnitDescription::default();
        unit.executable = "/bin/echo".into();
        unit.arguments = vec!["hi".into()];
        let slot = OpaqueSlot::Continuous(vec!["localhost:0".into()]);
        let cmd = ForkLaunch::for_test().render(&unit, &slot, "script.sh").unwrap();
        assert_eq!(cmd.command, "/bin/echo \"hi\"");
        assert!(cmd.hop_cmd.is_none());
    }
}
