//! The core-allocation scheduler: a flat continuous allocator and a 5D
//! torus sub-block allocator sharing one contract (spec.md §4.3, §4.4).
//!
//! Both variants serialize allocate/release under a single lock, park
//! unsatisfiable requests on a FIFO wait queue, and retry that queue in
//! order whenever a unit releases its slot (the RESCHEDULE signal).

pub mod continuous;
pub mod torus;

use crate::error::{AgentError, AgentResult};
use crate::execution::queue::QueueSender;
use crate::model::{ComputeUnit, OpaqueSlot};
use continuous::{SlotMap, WaitQueue};
use tokio::sync::Mutex;
use torus::{ShapeTable, TorusBlock};

struct ContinuousState {
    map: SlotMap,
    wait_queue: WaitQueue<ComputeUnit>,
}

/// The flat "continuous" scheduler (spec.md §4.3).
pub struct ContinuousScheduler {
    state: Mutex<ContinuousState>,
    cores_per_node: u32,
    exec_tx: QueueSender<ComputeUnit>,
}

impl ContinuousScheduler {
    pub fn new(node_list: &[String], cores_per_node: u32, exec_tx: QueueSender<ComputeUnit>) -> Self {
        Self {
            state: Mutex::new(ContinuousState {
                map: SlotMap::new(node_list, cores_per_node),
                wait_queue: WaitQueue::default(),
            }),
            cores_per_node,
            exec_tx,
        }
    }

    pub async fn schedule(&self, mut cu: ComputeUnit) -> AgentResult<()> {
        let mut state = self.state.lock().await;
        match state.map.allocate(cu.description.cores, self.cores_per_node) {
            Some(slots) => {
                drop(state);
                cu.opaque_slot = Some(OpaqueSlot::Continuous(slots));
                self.exec_tx.push(cu)
            }
            None => {
                state.wait_queue.push_back(cu);
                Ok(())
            }
        }
    }

    pub async fn unschedule(&self, cu: &ComputeUnit) -> AgentResult<()> {
        let mut guard = self.state.lock().await;
        if let Some(OpaqueSlot::Continuous(slots)) = &cu.opaque_slot {
            guard.map.release(slots);
        } else {
            return Err(AgentError::Internal(format!(
                "unschedule called on {} without a continuous slot",
                cu.uid
            )));
        }
        self.reschedule(&mut guard);
        Ok(())
    }

    /// RESCHEDULE: walk the wait queue in FIFO order, forwarding every
    /// unit that now fits.
    fn reschedule(&self, state: &mut ContinuousState) {
        let cores_per_node = self.cores_per_node;
        let ContinuousState { map, wait_queue } = state;
        let mut to_forward = Vec::new();
        wait_queue.retain_unallocated(|cu| match map.allocate(cu.description.cores, cores_per_node) {
            Some(slots) => {
                let mut cu = cu.clone();
                cu.opaque_slot = Some(OpaqueSlot::Continuous(slots));
                to_forward.push(cu);
                true
            }
            None => false,
        });
        for cu in to_forward {
            let _ = self.exec_tx.push(cu);
        }
    }

    pub async fn busy_count(&self) -> usize {
        self.state.lock().await.map.busy_count()
    }

    pub async fn all_free(&self) -> bool {
        self.state.lock().await.map.all_free()
    }
}

struct TorusState {
    block: TorusBlock,
    wait_queue: WaitQueue<ComputeUnit>,
}

/// The 5D BG/Q-style sub-block scheduler (spec.md §4.4).
pub struct TorusScheduler {
    state: Mutex<TorusState>,
    shape_table: ShapeTable,
    cores_per_node: u32,
    exec_tx: QueueSender<ComputeUnit>,
}

impl TorusScheduler {
    pub fn new(block: TorusBlock, shape_table: ShapeTable, cores_per_node: u32, exec_tx: QueueSender<ComputeUnit>) -> Self {
        Self {
            state: Mutex::new(TorusState { block, wait_queue: WaitQueue::default() }),
            shape_table,
            cores_per_node,
            exec_tx,
        }
    }

    fn nodes_needed(&self, cores: u32) -> AgentResult<u32> {
        let raw = cores.div_ceil(self.cores_per_node.max(1));
        self.shape_table
            .round_up(raw)
            .ok_or_else(|| AgentError::Config(format!("no sub-block shape covers {raw} nodes")))
    }

    pub async fn schedule(&self, mut cu: ComputeUnit) -> AgentResult<()> {
        let n = self.nodes_needed(cu.description.cores)?;
        let shape = self.shape_table.get(n).expect("round_up returned a registered size");
        let mut state = self.state.lock().await;
        match state.block.allocate(n as usize) {
            Some(corner) => {
                drop(state);
                cu.opaque_slot = Some(OpaqueSlot::Torus { corner, shape });
                self.exec_tx.push(cu)
            }
            None => {
                state.wait_queue.push_back(cu);
                Ok(())
            }
        }
    }

    pub async fn unschedule(&self, cu: &ComputeUnit) -> AgentResult<()> {
        let mut guard = self.state.lock().await;
        if let Some(OpaqueSlot::Torus { corner, shape }) = &cu.opaque_slot {
            if !guard.block.release(*corner, shape.product() as usize) {
                return Err(AgentError::Internal(format!(
                    "release of {} targeted an already-FREE window",
                    cu.uid
                )));
            }
        } else {
            return Err(AgentError::Internal(format!(
                "unschedule called on {} without a torus slot",
                cu.uid
            )));
        }
        self.reschedule(&mut guard);
        Ok(())
    }

    fn reschedule(&self, state: &mut TorusState) {
        let shape_table = &self.shape_table;
        let cores_per_node = self.cores_per_node;
        let TorusState { block, wait_queue } = state;
        let mut to_forward = Vec::new();
        wait_queue.retain_unallocated(|cu| {
            let raw = cu.description.cores.div_ceil(cores_per_node.max(1));
            let Some(n) = shape_table.round_up(raw) else {
                return false;
            };
            let Some(shape) = shape_table.get(n) else {
                return false;
            };
            match block.allocate(n as usize) {
                Some(corner) => {
                    let mut cu = cu.clone();
                    cu.opaque_slot = Some(OpaqueSlot::Torus { corner, shape });
                    to_forward.push(cu);
                    true
                }
                None => false,
            }
        });
        for cu in to_forward {
            let _ = self.exec_tx.push(cu);
        }
    }

    pub async fn all_free(&self) -> bool {
        self.state.lock().await.block.all_free()
    }
}

/// Runtime-selected scheduler, matching [`crate::config::SchedulerKind`].
pub enum AnyScheduler {
    Continuous(ContinuousScheduler),
    Torus(TorusScheduler),
}

impl AnyScheduler {
    pub async fn schedule(&self, cu: ComputeUnit) -> AgentResult<()> {
        match self {
            AnyScheduler::Continuous(s) => s.schedule(cu).await,
            AnyScheduler::Torus(s) => s.schedule(cu).await,
        }
    }

    pub async fn unschedule(&self, cu: &ComputeUnit) -> AgentResult<()> {
        match self {
            AnyScheduler::Continuous(s) => s.unschedule(cu).await,
            AnyScheduler::Torus(s) => s.unschedule(cu).await,
        }
    }

    pub async fn all_free(&self) -> bool {
        match self {
            AnyScheduler::Continuous(s) => s.all_free().await,
            AnyScheduler::Torus(s) => s.all_free().await,
        }
    }
}
