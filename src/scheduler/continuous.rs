//! Flat core-allocation scheduler (spec.md §4.3).
//!
//! Owns an ordered `Vec<Node>` slot map. Single-node requests scan one
//! node for a sliding window of FREE cores; multi-node requests flatten
//! every node's core vector into one logical vector and slide a window
//! across the concatenation, then translate the window back to a
//! `"node:core"` list.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreCell {
    Free,
    Busy,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub cores: Vec<CoreCell>,
}

/// The flat slot map: `nodes.len() == node_list.len()`, every
/// `cores.len() == cores_per_node`.
#[derive(Debug, Clone)]
pub struct SlotMap {
    nodes: Vec<Node>,
}

impl SlotMap {
    pub fn new(node_list: &[String], cores_per_node: u32) -> Self {
        let nodes = node_list
            .iter()
            .map(|name| Node {
                name: name.clone(),
                cores: vec![CoreCell::Free; cores_per_node as usize],
            })
            .collect();
        Self { nodes }
    }

    pub fn busy_count(&self) -> usize {
        self.nodes
            .iter()
            .flat_map(|n| n.cores.iter())
            .filter(|c| **c == CoreCell::Busy)
            .count()
    }

    pub fn all_free(&self) -> bool {
        self.busy_count() == 0
    }

    /// Try to allocate `n` cores. Single-node if `n < cores_per_node`,
    /// otherwise multi-node. Returns the `"node:core"` list on success.
    pub fn allocate(&mut self, n: u32, cores_per_node: u32) -> Option<Vec<String>> {
        let n = n as usize;
        if n == 0 {
            return None;
        }
        if n < cores_per_node as usize {
            self.allocate_single_node(n)
        } else {
            self.allocate_multi_node(n)
        }
    }

    fn allocate_single_node(&mut self, n: usize) -> Option<Vec<String>> {
        for node in &mut self.nodes {
            if let Some(start) = find_free_window(&node.cores, n) {
                for c in &mut node.cores[start..start + n] {
                    *c = CoreCell::Busy;
                }
                return Some((start..start + n).map(|i| format!("{}:{}", node.name, i)).collect());
            }
        }
        None
    }

    fn allocate_multi_node(&mut self, n: usize) -> Option<Vec<String>> {
        let cores_per_node = self.nodes.first()?.cores.len();
        let total = self.nodes.len() * cores_per_node;
        let flat: Vec<CoreCell> = self.nodes.iter().flat_map(|nd| nd.cores.iter().copied()).collect();
        let start = find_free_window(&flat, n)?;
        if start + n > total {
            return None;
        }
        let mut slots = Vec::with_capacity(n);
        for global in start..start + n {
            let node_idx = global / cores_per_node;
            let core_idx = global % cores_per_node;
            self.nodes[node_idx].cores[core_idx] = CoreCell::Busy;
            slots.push(format!("{}:{}", self.nodes[node_idx].name, core_idx));
        }
        Some(slots)
    }

    /// Mark every cell named in `slots` FREE again.
    pub fn release(&mut self, slots: &[String]) {
        for slot in slots {
            let Some((node_name, core_str)) = slot.split_once(':') else { continue };
            let Ok(core_idx) = core_str.parse::<usize>() else { continue };
            if let Some(node) = self.nodes.iter_mut().find(|n| n.name == node_name) {
                if let Some(cell) = node.cores.get_mut(core_idx) {
                    *cell = CoreCell::Free;
                }
            }
        }
    }
}

fn find_free_window(cores: &[CoreCell], n: usize) -> Option<usize> {
    if n == 0 || n > cores.len() {
        return None;
    }
    cores.windows(n).position(|w| w.iter().all(|c| *c == CoreCell::Free))
}

/// FIFO wait queue of unit uids parked because allocation failed,
/// retried in insertion order on every RESCHEDULE.
#[derive(Debug)]
pub struct WaitQueue<T> {
    items: VecDeque<T>,
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        Self { items: VecDeque::new() }
    }
}

impl<T> WaitQueue<T> {
    pub fn push_back(&mut self, item: T) {
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Walk the queue in FIFO order, letting `try_alloc` attempt each
    /// item; items it accepts (returns `true`) are removed in place,
    /// everything else stays parked in its original relative order.
    pub fn retain_unallocated(&mut self, mut try_alloc: impl FnMut(&T) -> bool) {
        let drained: Vec<T> = self.items.drain(..).collect();
        for item in drained {
            if !try_alloc(&item) {
                self.items.push_back(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_node_allocation_finds_first_run() {
        let mut map = SlotMap::new(&["n0".into(), "n1".into()], 4);
        let slots = map.allocate(2, 4).unwrap();
        assert_eq!(slots, vec!["n0:0".to_string(), "n0:1".to_string()]);
    }

    #[test]
    fn multi_node_allocation_spans_nodes() {
        let mut map = SlotMap::new(&["n0".into(), "n1".into()], 2);
        // occupy both cores on n0 first
        map.allocate(2, 2).unwrap();
        let slots = map.allocate(2, 2).unwrap();
        assert_eq!(slots, vec!["n1:0".to_string(), "n1:1".to_string()]);
    }

    #[test]
    fn release_frees_exact_cells() {
        let mut map = SlotMap::new(&["n0".into()], 4);
        let slots = map.allocate(3, 4).unwrap();
        assert_eq!(map.busy_count(), 3);
        map.release(&slots);
        assert!(map.all_free());
    }

    #[test]
    fn allocation_fails_when_no_window_fits() {
        let mut map = SlotMap::new(&["n0".into()], 2);
        map.allocate(2, 2).unwrap();
        assert!(map.allocate(1, 2).is_none());
    }

    #[test]
    fn wait_queue_preserves_fifo_order_for_unallocated() {
        let mut wq: WaitQueue<i32> = WaitQueue::default();
        wq.push_back(1);
        wq.push_back(2);
        wq.push_back(3);
        let mut allocated = Vec::new();
        wq.retain_unallocated(|item| {
            if *item != 2 {
                allocated.push(*item);
                true
            } else {
                false
            }
        });
        assert_eq!(allocated, vec![1, 3]);
        assert_eq!(wq.len(), 1);
    }

    proptest! {
        // Testable property #2 (spec.md §8): no two live CUs ever share a
        // "node:core" slot. Replays a sequence of allocate/release requests
        // and checks every newly issued slot against every slot currently
        // held by a still-live allocation.
        #[test]
        fn allocations_never_share_a_slot(requests in prop::collection::vec(1u32..=4, 1..16)) {
            let mut map = SlotMap::new(&["n0".into(), "n1".into(), "n2".into()], 4);
            let mut held: Vec<Vec<String>> = Vec::new();

            for (i, n) in requests.iter().enumerate() {
                if let Some(slots) = map.allocate(*n, 4) {
                    for prior in &held {
                        for slot in &slots {
                            prop_assert!(!prior.contains(slot), "slot {slot} double-issued");
                        }
                    }
                    held.push(slots);
                }
                if i % 3 == 2 {
                    if let Some(freed) = held.pop() {
                        map.release(&freed);
                    }
                }
            }
        }
    }
}
