//! LSF probe: `LSB_DJOB_HOSTFILE` (one host per line, repeated per slot)
//! or `LSB_MCPU_HOSTS` (`host1 n1 host2 n2 ...`).

use super::{parse_repeated_hostfile, LrmsDescriptor, LrmsProbe};
use crate::error::{AgentError, AgentResult};

pub struct LsfProbe;

impl LrmsProbe for LsfProbe {
    fn probe(&self, requested_cores: u32) -> AgentResult<LrmsDescriptor> {
        let (node_list, cores_per_node) = if let Ok(path) = std::env::var("LSB_DJOB_HOSTFILE") {
            let contents =
                std::fs::read_to_string(&path).map_err(|e| AgentError::Config(format!("cannot read LSB_DJOB_HOSTFILE {path}: {e}")))?;
            parse_repeated_hostfile(&contents)
        } else if let Ok(mcpu) = std::env::var("LSB_MCPU_HOSTS") {
            parse_mcpu_hosts(&mcpu)?
        } else {
            return Err(AgentError::Config(
                "neither LSB_DJOB_HOSTFILE nor LSB_MCPU_HOSTS is set".to_string(),
            ));
        };

        LrmsDescriptor {
            name: "lsf",
            node_list,
            cores_per_node,
            torus_block: None,
            shape_table: None,
            block_handle: None,
        }
        .validate(requested_cores)
    }
}

fn parse_mcpu_hosts(spec: &str) -> AgentResult<(Vec<String>, u32)> {
    let tokens: Vec<&str> = spec.split_whitespace().collect();
    if tokens.len() % 2 != 0 || tokens.is_empty() {
        return Err(AgentError::Config(format!("malformed LSB_MCPU_HOSTS: {spec}")));
    }
    let mut nodes = Vec::new();
    let mut min_cores = u32::MAX;
    for pair in tokens.chunks(2) {
        nodes.push(pair[0].to_string());
        let cores: u32 = pair[1]
            .parse()
            .map_err(|_| AgentError::Config(format!("non-numeric core count in LSB_MCPU_HOSTS: {}", pair[1])))?;
        min_cores = min_cores.min(cores);
    }
    Ok((nodes, min_cores))
}
