//! Torque probe: `PBS_NODEFILE`, `PBS_NUM_NODES`, `PBS_NUM_PPN`, `PBS_NCPUS`.

use super::{parse_repeated_hostfile, required_env, LrmsDescriptor, LrmsProbe};
use crate::error::{AgentError, AgentResult};

pub struct TorqueProbe;

impl LrmsProbe for TorqueProbe {
    fn probe(&self, requested_cores: u32) -> AgentResult<LrmsDescriptor> {
        let nodefile = required_env("PBS_NODEFILE")?;
        let contents = std::fs::read_to_string(&nodefile)
            .map_err(|e| AgentError::Config(format!("cannot read PBS_NODEFILE {nodefile}: {e}")))?;
        let (node_list, mut cores_per_node) = parse_repeated_hostfile(&contents);

        if let Ok(ppn) = std::env::var("PBS_NUM_PPN") {
            cores_per_node = ppn
                .parse()
                .map_err(|_| AgentError::Config(format!("PBS_NUM_PPN is not an integer: {ppn}")))?;
        } else if let Ok(ncpus) = std::env::var("PBS_NCPUS") {
            let ncpus: u32 = ncpus
                .parse()
                .map_err(|_| AgentError::Config(format!("PBS_NCPUS is not an integer: {ncpus}")))?;
            if !node_list.is_empty() {
                cores_per_node = ncpus / node_list.len() as u32;
            }
        }

        LrmsDescriptor {
            name: "torque",
            node_list,
            cores_per_node,
            torus_block: None,
            shape_table: None,
            block_handle: None,
        }
        .validate(requested_cores)
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse_repeated_hostfile;

    #[test]
    fn nodefile_with_explicit_ppn_override_uses_hostfile_order() {
        let (nodes, cores) = parse_repeated_hostfile("n0\nn0\nn0\nn0\nn1\nn1\nn1\nn1\n");
        assert_eq!(nodes, vec!["n0".to_string(), "n1".to_string()]);
        assert_eq!(cores, 4);
    }
}
