//! SGE probe: `PE_HOSTFILE` (lines of `hostname ncores queue ...`).

use super::{required_env, LrmsDescriptor, LrmsProbe};
use crate::error::{AgentError, AgentResult};

pub struct SgeProbe;

impl LrmsProbe for SgeProbe {
    fn probe(&self, requested_cores: u32) -> AgentResult<LrmsDescriptor> {
        let path = required_env("PE_HOSTFILE")?;
        let contents =
            std::fs::read_to_string(&path).map_err(|e| AgentError::Config(format!("cannot read PE_HOSTFILE {path}: {e}")))?;
        let (node_list, cores_per_node) = parse_pe_hostfile(&contents)?;

        LrmsDescriptor {
            name: "sge",
            node_list,
            cores_per_node,
            torus_block: None,
            shape_table: None,
            block_handle: None,
        }
        .validate(requested_cores)
    }
}

fn parse_pe_hostfile(contents: &str) -> AgentResult<(Vec<String>, u32)> {
    let mut node_list = Vec::new();
    let mut min_cores = u32::MAX;
    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }
        node_list.push(fields[0].to_string());
        let cores: u32 = fields[1]
            .parse()
            .map_err(|_| AgentError::Config(format!("PE_HOSTFILE line has non-numeric core count: {line}")))?;
        min_cores = min_cores.min(cores);
    }
    if node_list.is_empty() {
        return Err(AgentError::Config("PE_HOSTFILE has no host lines".to_string()));
    }
    Ok((node_list, min_cores))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hostname_and_core_count() {
        let (nodes, cores) = parse_pe_hostfile("n0 4 all.q@n0 UNDEFINED\nn1 4 all.q@n1 UNDEFINED\n").unwrap();
        assert_eq!(nodes, vec!["n0".to_string(), "n1".to_string()]);
        assert_eq!(cores, 4);
    }
}
