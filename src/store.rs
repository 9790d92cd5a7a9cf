//! Metadata-store abstraction: a queue-of-documents source plus a narrow
//! update sink (spec.md §9's fix for the cyclic Agent/worker references —
//! no component needs a handle back to the whole agent, only this).

use crate::error::AgentResult;
use crate::model::{ComputeUnit, Uid};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// One pilot-level external command read from the store's `commands[]`
/// array (spec.md §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CancelPilot,
    CancelComputeUnit(Uid),
    KeepAlive,
    /// Anything the heartbeat monitor doesn't recognize: logged and ignored.
    Unknown(String),
}

impl Command {
    pub fn parse(raw: &str) -> Self {
        if raw == "CANCEL_PILOT" {
            return Command::CancelPilot;
        }
        if raw == "KEEP_ALIVE" {
            return Command::KeepAlive;
        }
        if let Some(uid) = raw.strip_prefix("CANCEL_COMPUTE_UNIT(").and_then(|s| s.strip_suffix(')')) {
            return Command::CancelComputeUnit(uid.to_string());
        }
        Command::Unknown(raw.to_string())
    }
}

/// One pending `(uid, target_state, query, update)` record, collected into
/// bulks by the Update worker (spec.md §3, §4.7).
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub uid: Uid,
    pub unit: ComputeUnit,
    pub message: Option<String>,
}

/// The claimable-unit source: a cursor over `{pilot, state: PENDING_EXECUTION}`.
#[async_trait]
pub trait UnitSource: Send + Sync {
    /// Claim all currently pending units, performing the bulk
    /// `AGENT_SCHEDULING`/`AGENT_STAGING_INPUT` state update *before*
    /// returning them, per spec.md §6.
    async fn claim_pending(&self) -> AgentResult<Vec<ComputeUnit>>;
}

/// The narrow sink every pipeline stage uses to report CU/pilot state
/// without holding a handle to the whole agent.
#[async_trait]
pub trait UpdateSink: Send + Sync {
    async fn push(&self, request: UpdateRequest) -> AgentResult<()>;

    /// Atomically read and clear the pilot's `commands[]` array.
    async fn take_pilot_commands(&self) -> AgentResult<Vec<Command>>;

    async fn mark_pilot_state(&self, state: crate::model::PilotState, message: Option<String>) -> AgentResult<()>;
}

/// In-memory store used by tests and the Fork/smoke-test configuration:
/// a FIFO of pre-seeded units plus a log of applied updates.
#[derive(Default)]
pub struct MockStore {
    pending: Mutex<VecDeque<ComputeUnit>>,
    applied: Mutex<Vec<UpdateRequest>>,
    commands: Mutex<VecDeque<Command>>,
    pilot_states: Mutex<Vec<crate::model::PilotState>>,
}

impl MockStore {
    pub fn new(seed: Vec<ComputeUnit>) -> Self {
        Self {
            pending: Mutex::new(seed.into()),
            applied: Mutex::new(Vec::new()),
            commands: Mutex::new(VecDeque::new()),
            pilot_states: Mutex::new(Vec::new()),
        }
    }

    pub async fn push_command(&self, command: Command) {
        self.commands.lock().await.push_back(command);
    }

    pub async fn applied_updates(&self) -> Vec<UpdateRequest> {
        self.applied.lock().await.clone()
    }

    pub async fn pilot_state_history(&self) -> Vec<crate::model::PilotState> {
        self.pilot_states.lock().await.clone()
    }
}

#[async_trait]
impl UnitSource for MockStore {
    async fn claim_pending(&self) -> AgentResult<Vec<ComputeUnit>> {
        let mut pending = self.pending.lock().await;
        Ok(pending.drain(..).collect())
    }
}

#[async_trait]
impl UpdateSink for MockStore {
    async fn push(&self, request: UpdateRequest) -> AgentResult<()> {
        self.applied.lock().await.push(request);
        Ok(())
    }

    async fn take_pilot_commands(&self) -> AgentResult<Vec<Command>> {
        let mut commands = self.commands.lock().await;
        Ok(commands.drain(..).collect())
    }

    async fn mark_pilot_state(&self, state: crate::model::PilotState, _message: Option<String>) -> AgentResult<()> {
        self.pilot_states.lock().await.push(state);
        Ok(())
    }
}
