//! Fork "LRMS": no batch system at all, just the local machine.

use super::{LrmsDescriptor, LrmsProbe};
use crate::error::AgentResult;

pub struct ForkProbe;

impl LrmsProbe for ForkProbe {
    fn probe(&self, requested_cores: u32) -> AgentResult<LrmsDescriptor> {
        let detected = num_cpus::get() as u32;
        let cores_per_node = detected.min(requested_cores.max(1)).max(1);
        LrmsDescriptor {
            name: "fork",
            node_list: vec!["localhost".to_string()],
            cores_per_node,
            torus_block: None,
            shape_table: None,
            block_handle: None,
        }
        .validate(cores_per_node)
    }
}
