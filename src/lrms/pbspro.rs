//! PBSPro probe: `PBS_NODEFILE`, `NUM_PPN`, `NODE_COUNT`, `NUM_PES`,
//! `PBS_JOBID`, falling back to `qstat -f`'s `exec_vnode` line.

use super::{parse_repeated_hostfile, required_env, LrmsDescriptor, LrmsProbe};
use crate::error::{AgentError, AgentResult};

pub struct PbsproProbe;

impl LrmsProbe for PbsproProbe {
    fn probe(&self, requested_cores: u32) -> AgentResult<LrmsDescriptor> {
        let nodefile = required_env("PBS_NODEFILE")?;
        let contents = std::fs::read_to_string(&nodefile)
            .map_err(|e| AgentError::Config(format!("cannot read PBS_NODEFILE {nodefile}: {e}")))?;
        let (mut node_list, mut cores_per_node) = parse_repeated_hostfile(&contents);

        match (std::env::var("NUM_PPN"), std::env::var("NODE_COUNT")) {
            (Ok(ppn), Ok(_)) => {
                cores_per_node = ppn
                    .parse()
                    .map_err(|_| AgentError::Config(format!("NUM_PPN is not an integer: {ppn}")))?;
            }
            _ => {
                // Fall back to parsing `qstat -f <jobid>`'s exec_vnode line.
                if let Ok(jobid) = std::env::var("PBS_JOBID") {
                    if let Ok(output) = std::process::Command::new("qstat").arg("-f").arg(&jobid).output() {
                        if let Ok(text) = String::from_utf8(output.stdout) {
                            if let Some((vnode_list, vnode_cores)) = parse_exec_vnode(&text) {
                                node_list = vnode_list;
                                cores_per_node = vnode_cores;
                            }
                        }
                    }
                }
            }
        }

        LrmsDescriptor {
            name: "pbspro",
            node_list,
            cores_per_node,
            torus_block: None,
            shape_table: None,
            block_handle: None,
        }
        .validate(requested_cores)
    }
}

/// Parse a `qstat -f` `exec_vnode` line like
/// `exec_vnode = (n0:ncpus=4)+(n1:ncpus=4)` into `(["n0","n1"], 4)`.
pub(crate) fn parse_exec_vnode(text: &str) -> Option<(Vec<String>, u32)> {
    let line = text.lines().find(|l| l.trim_start().starts_with("exec_vnode"))?;
    let (_, rhs) = line.split_once('=')?;
    let mut nodes = Vec::new();
    let mut cores_per_node = 0u32;
    for chunk in rhs.split('+') {
        let inner = chunk.trim().trim_start_matches('(').trim_end_matches(')');
        let (name, ncpus_part) = inner.split_once(':')?;
        let ncpus: u32 = ncpus_part.strip_prefix("ncpus=")?.trim().parse().ok()?;
        nodes.push(name.trim().to_string());
        cores_per_node = cores_per_node.max(ncpus);
    }
    if nodes.is_empty() {
        None
    } else {
        Some((nodes, cores_per_node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exec_vnode_line() {
        let text = "Job Id: 123.host\nexec_vnode = (n0:ncpus=4)+(n1:ncpus=4)\nResource_List...";
        let (nodes, cores) = parse_exec_vnode(text).unwrap();
        assert_eq!(nodes, vec!["n0".to_string(), "n1".to_string()]);
        assert_eq!(cores, 4);
    }

    #[test]
    fn missing_exec_vnode_is_none() {
        assert!(parse_exec_vnode("Job Id: 123.host\n").is_none());
    }
}
