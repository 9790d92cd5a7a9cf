//! LRMS probes: detect the enclosing batch system and produce the
//! immutable descriptor defined in spec.md §3/§4.1.
//!
//! The actual environment-variable and hostfile parsing is the part
//! spec.md calls out as an external-collaborator concern — this module
//! keeps that parsing thin and pushes the interesting invariants
//! (`cores_per_node >= 1`, capacity covers the request, torus entry
//! count) into [`LrmsDescriptor::validate`], which every backend goes
//! through before returning.

pub mod fork;
pub mod loadleveler;
pub mod lsf;
pub mod pbspro;
pub mod sge;
pub mod slurm;
pub mod torque;

use crate::config::LrmsKind;
use crate::error::{AgentError, AgentResult};
use crate::scheduler::torus::{ShapeTable, TorusBlock};

/// `{name, node_list[], cores_per_node, torus_block?, shape_table?, block_handle?}`.
/// Immutable after construction (spec.md §3).
#[derive(Debug, Clone)]
pub struct LrmsDescriptor {
    pub name: &'static str,
    pub node_list: Vec<String>,
    pub cores_per_node: u32,
    pub torus_block: Option<TorusBlock>,
    pub shape_table: Option<ShapeTable>,
    pub block_handle: Option<String>,
}

impl LrmsDescriptor {
    pub fn validate(self, requested_cores: u32) -> AgentResult<Self> {
        if self.node_list.is_empty() {
            return Err(AgentError::Config(format!("{} reported an empty node list", self.name)));
        }
        if self.cores_per_node < 1 {
            return Err(AgentError::Config(format!("{} reported cores_per_node < 1", self.name)));
        }
        let capacity = self.node_list.len() as u64 * self.cores_per_node as u64;
        if capacity < requested_cores as u64 {
            return Err(AgentError::Config(format!(
                "{} capacity {capacity} is below the requested {requested_cores} cores",
                self.name
            )));
        }
        Ok(self)
    }
}

/// Reads the batch-system environment and produces an [`LrmsDescriptor`].
pub trait LrmsProbe {
    fn probe(&self, requested_cores: u32) -> AgentResult<LrmsDescriptor>;
}

/// Read a mandatory environment variable, mapping absence to `ConfigError`.
pub(crate) fn required_env(key: &str) -> AgentResult<String> {
    std::env::var(key).map_err(|_| AgentError::Config(format!("missing required environment variable {key}")))
}

/// Parse a file with one hostname per line (repeated once per core, as
/// Torque/PBSPro/LSF hostfiles do), returning nodes in first-seen order
/// with their repeat count as cores-per-node (assumed uniform).
pub(crate) fn parse_repeated_hostfile(contents: &str) -> (Vec<String>, u32) {
    let mut order = Vec::new();
    let mut counts: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
    for line in contents.lines() {
        let host = line.trim();
        if host.is_empty() {
            continue;
        }
        if !counts.contains_key(host) {
            order.push(host.to_string());
        }
        *counts.entry(host.to_string()).or_insert(0) += 1;
    }
    let cores_per_node = order.first().and_then(|h| counts.get(h)).copied().unwrap_or(1);
    (order, cores_per_node)
}

/// Dispatch to the configured backend probe.
pub fn probe(kind: LrmsKind, requested_cores: u32) -> AgentResult<LrmsDescriptor> {
    match kind {
        LrmsKind::Torque => torque::TorqueProbe.probe(requested_cores),
        LrmsKind::Pbspro => pbspro::PbsproProbe.probe(requested_cores),
        LrmsKind::Slurm => slurm::SlurmProbe.probe(requested_cores),
        LrmsKind::Sge => sge::SgeProbe.probe(requested_cores),
        LrmsKind::Lsf => lsf::LsfProbe.probe(requested_cores),
        LrmsKind::Loadleveler => loadleveler::LoadLevelerProbe.probe(requested_cores),
        LrmsKind::Fork => fork::ForkProbe.probe(requested_cores),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_repeated_hostfile_counts_occurrences() {
        let (nodes, cores) = parse_repeated_hostfile("n0\nn0\nn1\nn1\n");
        assert_eq!(nodes, vec!["n0".to_string(), "n1".to_string()]);
        assert_eq!(cores, 2);
    }

    #[test]
    fn validate_rejects_insufficient_capacity() {
        let desc = LrmsDescriptor {
            name: "test",
            node_list: vec!["n0".into()],
            cores_per_node: 2,
            torus_block: None,
            shape_table: None,
            block_handle: None,
        };
        assert!(desc.validate(4).is_err());
    }
}
