//! Core data model: compute units, directives, and the totally-ordered
//! pilot/unit state machines of spec.md §3 and §4.9.

pub mod state;

pub use state::{PilotState, UnitState};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable identifier used for all cross-component references to a unit.
pub type Uid = String;

/// One `(node, core)` cell in the continuous scheduler, or one 5D torus
/// sub-block corner+shape in the torus scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpaqueSlot {
    /// Continuous scheduler: a list of `"node:core"` strings.
    Continuous(Vec<String>),
    /// Torus scheduler: a corner coordinate plus the allocated shape.
    Torus {
        corner: crate::scheduler::torus::Coord5,
        shape: crate::scheduler::torus::Shape5,
    },
}

/// Action a staging directive performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DirectiveAction {
    Link,
    Copy,
    Move,
    /// Remote transfer, delegated to an external mover. The agent
    /// rejects this with a clear error rather than implementing it.
    Transfer,
}

/// State of a single staging directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DirectiveState {
    Pending,
    Done,
    Failed,
}

/// One input/output staging directive: `{source, target, action, state}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub source: String,
    pub target: String,
    pub action: DirectiveAction,
    pub state: DirectiveState,
}

impl Directive {
    pub fn new(source: impl Into<String>, target: impl Into<String>, action: DirectiveAction) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            action,
            state: DirectiveState::Pending,
        }
    }
}

/// The executable, its arguments, environment, and staging directives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitDescription {
    pub executable: String,
    pub arguments: Vec<String>,
    pub environment: HashMap<String, String>,
    pub cores: u32,
    pub mpi: bool,
    pub pre_exec: Vec<String>,
    pub post_exec: Vec<String>,
    pub stdout: String,
    pub stderr: String,
}

impl Default for UnitDescription {
    fn default() -> Self {
        Self {
            executable: String::new(),
            arguments: Vec::new(),
            environment: HashMap::new(),
            cores: 1,
            mpi: false,
            pre_exec: Vec::new(),
            post_exec: Vec::new(),
            stdout: "STDOUT".into(),
            stderr: "STDERR".into(),
        }
    }
}

/// A single `{state, timestamp}` entry in a unit's history, or a
/// `{message, timestamp}` entry in its log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEntry<T> {
    pub value: T,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> TimestampedEntry<T> {
    pub fn now(value: T) -> Self {
        Self {
            value,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// A compute unit flowing through the pipeline. Owned by exactly one
/// component at a time (the one holding its queue entry, or the one
/// whose watch-set it belongs to) — ownership transfer is queue hand-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeUnit {
    pub uid: Uid,
    pub description: UnitDescription,
    pub state: UnitState,
    pub workdir: String,
    pub stdout_file: String,
    pub stderr_file: String,
    pub opaque_slot: Option<OpaqueSlot>,
    pub agent_input_directives: Vec<Directive>,
    pub agent_output_directives: Vec<Directive>,
    pub started: Option<chrono::DateTime<chrono::Utc>>,
    pub finished: Option<chrono::DateTime<chrono::Utc>>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub statehistory: Vec<TimestampedEntry<UnitState>>,
    pub log: Vec<TimestampedEntry<String>>,
    #[serde(skip)]
    pub pid: Option<u32>,
}

impl ComputeUnit {
    pub fn new(uid: impl Into<String>, description: UnitDescription) -> Self {
        let uid = uid.into();
        Self {
            uid: uid.clone(),
            description,
            state: UnitState::New,
            workdir: format!("./unit-{uid}"),
            stdout_file: "STDOUT".into(),
            stderr_file: "STDERR".into(),
            opaque_slot: None,
            agent_input_directives: Vec::new(),
            agent_output_directives: Vec::new(),
            started: None,
            finished: None,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            statehistory: Vec::new(),
            log: Vec::new(),
            pid: None,
        }
    }

    /// Whether this uid belongs to a load-testing clone (`uid.clone_NNNNN`).
    pub fn is_clone(&self) -> bool {
        self.uid.contains(".clone_")
    }

    /// The canonical uid, stripped of any `.clone_NNNNN` suffix.
    pub fn canonical_uid(&self) -> &str {
        self.uid.split(".clone_").next().unwrap_or(&self.uid)
    }

    pub fn clone_for_load_test(&self, index: u32) -> Self {
        let mut clone = self.clone();
        clone.uid = format!("{}.clone_{:05}", self.uid, index);
        clone.workdir = format!("./unit-{}", clone.uid);
        clone
    }

    /// Apply a transition, announcing every skipped intermediate state
    /// in order (spec.md §4.9 progression rule). Silently dropped if
    /// `target` is not strictly greater than the current state, or if
    /// the unit is already in a terminal state.
    pub fn advance_to(&mut self, target: UnitState) -> Vec<UnitState> {
        if self.state.is_terminal() || target.value() <= self.state.value() {
            return Vec::new();
        }
        let mut announced = Vec::new();
        for s in UnitState::ordered_between(self.state, target) {
            self.state = s;
            self.statehistory.push(TimestampedEntry::now(s));
            announced.push(s);
        }
        announced
    }

    pub fn append_log(&mut self, message: impl Into<String>) {
        self.log.push(TimestampedEntry::now(message.into()));
    }

    pub fn truncate_output(&mut self) {
        const KEEP: usize = 1024;
        for buf in [&mut self.stdout, &mut self.stderr] {
            if buf.len() > KEEP {
                let tail: String = buf.chars().rev().take(KEEP).collect::<String>().chars().rev().collect();
                *buf = format!("...[content shortened]...{tail}");
            }
        }
    }

    pub fn has_pending_ftw_directives(&self) -> bool {
        self.agent_output_directives
            .iter()
            .any(|d| d.action == DirectiveAction::Transfer && d.state == DirectiveState::Pending)
    }
}
