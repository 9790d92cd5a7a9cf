//! 5D torus block bookkeeping and sub-block allocation (spec.md §3 §4.4).
//!
//! Pure data types plus the allocation/release math; no knowledge of
//! compute units or queues lives here so [`crate::model`] can depend on
//! [`Coord5`]/[`Shape5`] without a cycle back to the scheduler.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A 5D coordinate on the torus (A, B, C, D, E axes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coord5 {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
    pub e: u32,
}

/// A 5D sub-block shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape5 {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
    pub e: u32,
}

impl Shape5 {
    pub fn product(&self) -> u64 {
        self.a as u64 * self.b as u64 * self.c as u64 * self.d as u64 * self.e as u64
    }
}

/// Map from supported sub-block node counts to their 5D shape, built
/// once per allocation from the LRMS-reported block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapeTable {
    sizes: BTreeMap<u32, Shape5>,
}

/// The sizes a BG/Q-style shape table is expected to support
/// (spec.md §3).
pub const SUPPORTED_SUB_BLOCK_SIZES: [u32; 10] =
    [1, 2, 4, 8, 16, 32, 64, 128, 256, 512];

impl ShapeTable {
    pub fn insert(&mut self, size: u32, shape: Shape5) {
        self.sizes.insert(size, shape);
    }

    pub fn get(&self, size: u32) -> Option<Shape5> {
        self.sizes.get(&size).copied()
    }

    /// The smallest supported size >= `n`, or `None` if `n` exceeds the
    /// largest configured size.
    pub fn round_up(&self, n: u32) -> Option<u32> {
        self.sizes.keys().find(|&&s| s >= n).copied()
    }

    /// Build a shape table by deriving shapes for each supported size
    /// from a full torus block's own shape, via standard BG/Q splitting
    /// (halve the longest axis repeatedly). `full_shape` is the shape of
    /// the entire allocated block (the largest supported size).
    pub fn from_full_block_shape(full_shape: Shape5) -> Self {
        let mut table = ShapeTable::default();
        let mut shape = full_shape;
        let mut size = shape.product() as u32;
        loop {
            table.insert(size, shape);
            if size <= 1 {
                break;
            }
            shape = halve_longest_axis(shape);
            let new_size = shape.product() as u32;
            if new_size == size {
                break;
            }
            size = new_size;
        }
        table
    }
}

fn halve_longest_axis(shape: Shape5) -> Shape5 {
    let axes = [shape.a, shape.b, shape.c, shape.d, shape.e];
    let (idx, &max) = axes
        .iter()
        .enumerate()
        .max_by_key(|(_, v)| **v)
        .unwrap();
    if max <= 1 {
        return shape;
    }
    let mut out = axes;
    out[idx] = max / 2;
    Shape5 {
        a: out[0],
        b: out[1],
        c: out[2],
        d: out[3],
        e: out[4],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Free,
    Busy,
}

/// One node of the torus block.
#[derive(Debug, Clone)]
pub struct TorusEntry {
    pub index: usize,
    pub coord: Coord5,
    pub node_name: String,
    pub status: EntryStatus,
}

/// An ordered list of nodes with 5D coordinates, carved out of the
/// hardware topology at LRMS-probe time. The scheduler only mutates
/// `status`; node names and coordinates are immutable after construction.
#[derive(Debug, Clone)]
pub struct TorusBlock {
    entries: Vec<TorusEntry>,
}

impl TorusBlock {
    pub fn new(entries: Vec<TorusEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TorusEntry] {
        &self.entries
    }

    pub fn all_free(&self) -> bool {
        self.entries.iter().all(|e| e.status == EntryStatus::Free)
    }

    /// Find a window of `n` consecutive FREE entries at an offset that
    /// is a multiple of `n`, mark them BUSY, and return the corner
    /// coordinate of the window's first entry.
    pub fn allocate(&mut self, n: usize) -> Option<Coord5> {
        if n == 0 || n > self.entries.len() {
            return None;
        }
        let mut offset = 0;
        while offset + n <= self.entries.len() {
            if self.entries[offset..offset + n]
                .iter()
                .all(|e| e.status == EntryStatus::Free)
            {
                for e in &mut self.entries[offset..offset + n] {
                    e.status = EntryStatus::Busy;
                }
                return Some(self.entries[offset].coord);
            }
            offset += n;
        }
        None
    }

    /// Release the `n`-entry window whose corner matches `corner`.
    /// Every freed entry must have been BUSY; returns `false`
    /// (a programmer error) if any entry in the window was already FREE.
    pub fn release(&mut self, corner: Coord5, n: usize) -> bool {
        let Some(offset) = self
            .entries
            .iter()
            .position(|e| coords_eq(e.coord, corner))
        else {
            return false;
        };
        if offset + n > self.entries.len() {
            return false;
        }
        if self.entries[offset..offset + n]
            .iter()
            .any(|e| e.status == EntryStatus::Free)
        {
            return false;
        }
        for e in &mut self.entries[offset..offset + n] {
            e.status = EntryStatus::Free;
        }
        true
    }
}

fn coords_eq(a: Coord5, b: Coord5) -> bool {
    a.a == b.a && a.b == b.b && a.c == b.c && a.d == b.d && a.e == b.e
}
