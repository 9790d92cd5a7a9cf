//! ssh launch method: the only backend that produces a hop command,
//! re-invoking the rendered script on the unit's allocated host.

use super::{continuous_hosts, executable_line, find_on_path, LaunchCommand, LaunchMethod};
use crate::error::{AgentError, AgentResult};
use crate::model::{OpaqueSlot, UnitDescription};
use std::path::PathBuf;

pub struct SshLaunch {
    binary: PathBuf,
}

impl SshLaunch {
    pub fn new() -> AgentResult<Self> {
        Ok(Self { binary: find_on_path("ssh")? })
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self { binary: PathBuf::from("/usr/bin/ssh") }
    }
}

impl LaunchMethod for SshLaunch {
    fn name(&self) -> &'static str {
        "ssh"
    }

    fn render(&self, unit: &UnitDescription, slot: &OpaqueSlot, script_path: &str) -> AgentResult<LaunchCommand> {
        let hosts = continuous_hosts(slot)?;
        let host = hosts.first().ok_or_else(|| AgentError::Internal("ssh launch given an empty slot".to_string()))?;
        Ok(LaunchCommand {
            command: executable_line(unit),
            hop_cmd: Some(format!("{} {} {}", self.binary.display(), host, script_path)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_cmd_re_invokes_the_script_on_the_first_host() {
        let mut unit = UnitDescription::default();
        unit.executable = "/bin/echo".into();
        unit.arguments = vec!["hi".into()];
        let slot = OpaqueSlot::Continuous(vec!["n0:0".into()]);
        let cmd = SshLaunch::for_test().render(&unit, &slot, "./unit-u1/launch.sh").unwrap();
        assert_eq!(cmd.command, "/bin/echo \"hi\"");
        assert_eq!(cmd.hop_cmd.as_deref(), Some("/usr/bin/ssh n0 ./unit-u1/launch.sh"));
    }
}
