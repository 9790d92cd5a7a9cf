//! SLURM probe: `SLURM_NODELIST`, `SLURM_NPROCS`, `SLURM_NNODES`,
//! `SLURM_CPUS_ON_NODE`.

use super::{required_env, LrmsDescriptor, LrmsProbe};
use crate::error::{AgentError, AgentResult};

pub struct SlurmProbe;

impl LrmsProbe for SlurmProbe {
    fn probe(&self, requested_cores: u32) -> AgentResult<LrmsDescriptor> {
        let nodelist = required_env("SLURM_NODELIST")?;
        let node_list = expand_hostlist(&nodelist)
            .ok_or_else(|| AgentError::Config(format!("cannot parse SLURM_NODELIST: {nodelist}")))?;
        let cores_per_node = std::env::var("SLURM_CPUS_ON_NODE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        LrmsDescriptor {
            name: "slurm",
            node_list,
            cores_per_node,
            torus_block: None,
            shape_table: None,
            block_handle: None,
        }
        .validate(requested_cores)
    }
}

/// Expand a SLURM-style compressed host list, e.g. `node[01-03,07]` or a
/// plain comma-separated list `n1,n2,n3`, into individual hostnames.
pub(crate) fn expand_hostlist(spec: &str) -> Option<Vec<String>> {
    let mut out = Vec::new();
    for group in split_top_level_commas(spec) {
        match group.split_once('[') {
            None => out.push(group.to_string()),
            Some((prefix, rest)) => {
                let ranges = rest.strip_suffix(']')?;
                for part in ranges.split(',') {
                    match part.split_once('-') {
                        Some((lo, hi)) => {
                            let width = lo.len();
                            let lo_n: u32 = lo.parse().ok()?;
                            let hi_n: u32 = hi.parse().ok()?;
                            for n in lo_n..=hi_n {
                                out.push(format!("{prefix}{n:0width$}"));
                            }
                        }
                        None => out.push(format!("{prefix}{part}")),
                    }
                }
            }
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Split on commas that are not inside a `[...]` range group.
fn split_top_level_commas(spec: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in spec.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => {
                groups.push(&spec[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    groups.push(&spec[start..]);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_a_simple_range() {
        let nodes = expand_hostlist("node[01-03]").unwrap();
        assert_eq!(nodes, vec!["node01", "node02", "node03"]);
    }

    #[test]
    fn expands_a_range_plus_discrete_value() {
        let nodes = expand_hostlist("node[01-02,07]").unwrap();
        assert_eq!(nodes, vec!["node01", "node02", "node07"]);
    }

    #[test]
    fn plain_comma_list_has_no_brackets() {
        let nodes = expand_hostlist("n1,n2,n3").unwrap();
        assert_eq!(nodes, vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn preserves_zero_padding_width() {
        let nodes = expand_hostlist("gpu[008-010]").unwrap();
        assert_eq!(nodes, vec!["gpu008", "gpu009", "gpu010"]);
    }
}
