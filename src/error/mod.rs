//! Error taxonomy for the pilot agent
//!
//! Mirrors the error kinds of the pipeline design: a `ConfigError` or
//! `InternalError` tears down the whole agent, everything else fails only
//! the unit (or the single directive) that raised it.
//!
//! ```text
//! AgentError (top-level)
//! ├── Config      — LRMS/launcher/scheduler misconfiguration (fatal)
//! ├── Staging     — per-directive filesystem failure (fails one CU)
//! ├── Spawn       — launch-script/process spawn failure (fails one CU)
//! ├── UnitExecution — non-zero exit code (fails one CU)
//! ├── CancelRequested — external cancel observed
//! ├── Store       — metadata-store update failed (logged, not fatal)
//! └── Internal    — uncaught worker-loop failure (fatal)
//! ```

use std::fmt;

/// Result type used throughout the pilot agent.
pub type AgentResult<T> = Result<T, AgentError>;

/// Top-level error type for the pilot agent pipeline.
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    /// LRMS environment missing/inconsistent, launcher binary not found,
    /// or an unknown scheduler/launch-method/spawner name was configured.
    /// Fatal: the pilot is failed before the main loop starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// A staging directive (LINK/COPY/MOVE/TRANSFER) failed. Fails only
    /// the affected compute unit; other units proceed.
    #[error("staging failed for {uid} ({src_path}→{target}): {reason}")]
    Staging {
        uid: String,
        src_path: String,
        target: String,
        reason: String,
    },

    /// Launch-script rendering or process spawn failed. Fails the unit
    /// and releases any slots it held.
    #[error("spawn failed for {uid}: {reason}")]
    Spawn { uid: String, reason: String },

    /// The unit's process exited with a non-zero code.
    #[error("unit {uid} exited with code {exit_code}")]
    UnitExecution { uid: String, exit_code: i32 },

    /// An external CANCEL_COMPUTE_UNIT or CANCEL_PILOT command was
    /// observed and honored.
    #[error("cancel requested for {0}")]
    CancelRequested(String),

    /// The metadata store rejected or failed an update. Logged and
    /// retried implicitly by bulk semantics; does not fail the pilot
    /// (open question in the design notes, preserved from the source).
    #[error("store error: {0}")]
    Store(String),

    /// Uncaught exception in a worker loop or the main loop. Fatal: the
    /// agent stops and the pilot is failed with a captured trace.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Whether this error kind tears down the whole agent rather than
    /// just failing the unit/directive that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::Config(_) | AgentError::Internal(_))
    }

    /// Attach a unit uid to an error that doesn't already carry one,
    /// for diagnostics attached to the unit's final state update.
    pub fn with_uid(self, uid: &str) -> Self {
        match self {
            AgentError::Internal(msg) => {
                AgentError::Internal(format!("[{uid}] {msg}"))
            }
            AgentError::Store(msg) => AgentError::Store(format!("[{uid}] {msg}")),
            AgentError::Staging { src_path, target, reason, .. } => {
                AgentError::Staging { uid: uid.to_string(), src_path, target, reason }
            }
            other => other,
        }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::Internal(format!("io error: {err}"))
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Internal(format!("json error: {err}"))
    }
}

/// A diagnostic line attached to a unit or pilot on failure, mirroring
/// the `{message, timestamp}` log entries the Update worker appends.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn from_error(err: &AgentError) -> Self {
        Self::new(err.to_string())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.to_rfc3339(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_and_internal_are_fatal() {
        assert!(AgentError::Config("missing PBS_NODEFILE".into()).is_fatal());
        assert!(AgentError::Internal("panic in watcher".into()).is_fatal());
    }

    #[test]
    fn staging_and_store_are_not_fatal() {
        assert!(!AgentError::Store("timeout".into()).is_fatal());
        assert!(!AgentError::Staging {
            uid: "u1".into(),
            src_path: "a".into(),
            target: "b".into(),
            reason: "missing".into(),
        }
        .is_fatal());
    }

    #[test]
    fn with_uid_prefixes_internal_and_store() {
        let err = AgentError::Internal("boom".into()).with_uid("unit-7");
        assert_eq!(err.to_string(), "internal error: [unit-7] boom");
    }
}
