//! Agent configuration
//!
//! A single immutable [`AgentConfig`] assembled once from CLI flags and an
//! optional JSON overlay, then passed by reference to every component.
//! Replaces the scattered module-level globals the design notes call out
//! (clone factors, worker counts, profiling toggles all live here instead).

use crate::error::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which core-allocation scheduler to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    Continuous,
    Torus,
}

/// Which LRMS backend to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LrmsKind {
    Torque,
    Pbspro,
    Slurm,
    Sge,
    Lsf,
    Loadleveler,
    Fork,
}

/// Which spawner backend to use for the Exec worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnerKind {
    /// Direct `std::process::Command` spawn per unit.
    Direct,
    /// Single long-lived shell-spawner subprocess, bulk launch commands.
    ShellSpawner,
}

/// How many times a unit should be cloned at ingest for load testing.
/// A no-op (`factor <= 1`) in normal operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CloneFactor {
    pub factor: u32,
    /// Pipeline stage at which clones are dropped again.
    pub drop_at: CloneDropStage,
}

impl Default for CloneFactor {
    fn default() -> Self {
        Self {
            factor: 1,
            drop_at: CloneDropStage::StageOut,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneDropStage {
    StageIn,
    Schedule,
    Exec,
    StageOut,
}

/// Worker population, all configurable per spec §5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerCounts {
    pub stage_in: usize,
    pub exec: usize,
    pub stage_out: usize,
    pub update: usize,
}

impl Default for WorkerCounts {
    fn default() -> Self {
        Self {
            stage_in: 1,
            exec: 1,
            stage_out: 1,
            update: 1,
        }
    }
}

/// Immutable agent configuration, constructed once at startup from the
/// CLI surface of spec.md §6 plus an optional JSON overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub cores: u32,
    pub debug_level: u8,
    pub task_launch_method: String,
    pub mpi_launch_method: String,
    pub lrms: LrmsKind,
    pub mongodb_url: String,
    pub mongodb_name: String,
    pub mongodb_auth: Option<String>,
    pub spawner: SpawnerKind,
    pub pilot_id: String,
    pub agent_scheduler: SchedulerKind,
    /// Wall-clock runtime budget in minutes.
    pub runtime_minutes: u64,
    pub session_id: String,
    #[serde(default)]
    pub workers: WorkerCounts,
    #[serde(default)]
    pub clone_factor: CloneFactor,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_bulk_collection_ms")]
    pub bulk_collection_ms: u64,
    #[serde(default = "default_watcher_poll_ms")]
    pub watcher_poll_ms: u64,
}

fn default_heartbeat_interval_secs() -> u64 {
    10
}

fn default_bulk_collection_ms() -> u64 {
    1000
}

fn default_watcher_poll_ms() -> u64 {
    100
}

impl AgentConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn bulk_collection_time(&self) -> Duration {
        Duration::from_millis(self.bulk_collection_ms)
    }

    pub fn watcher_poll_interval(&self) -> Duration {
        Duration::from_millis(self.watcher_poll_ms)
    }

    pub fn runtime_deadline(
        &self,
        start_time: chrono::DateTime<chrono::Utc>,
    ) -> chrono::DateTime<chrono::Utc> {
        start_time + chrono::Duration::seconds((self.runtime_minutes * 60) as i64)
    }

    /// Validate required invariants (ConfigError on violation).
    pub fn validate(&self) -> AgentResult<()> {
        if self.cores == 0 {
            return Err(AgentError::Config("cores must be >= 1".into()));
        }
        if self.pilot_id.is_empty() {
            return Err(AgentError::Config("pilot_id must not be empty".into()));
        }
        if self.session_id.is_empty() {
            return Err(AgentError::Config("session_id must not be empty".into()));
        }
        if self.mongodb_url.is_empty() {
            return Err(AgentError::Config("mongodb_url must not be empty".into()));
        }
        if self.runtime_minutes == 0 {
            return Err(AgentError::Config("runtime must be >= 1 minute".into()));
        }
        Ok(())
    }
}

/// Loads an [`AgentConfig`] from CLI flags, optionally overlaid with a
/// JSON config file. Mirrors the `ConfigLoader`/overlay split so callers
/// never reach for ad hoc globals.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from a JSON file on disk.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> AgentResult<AgentConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("failed to read config: {e}")))?;
        Self::load_from_str(&content)
    }

    /// Load from a JSON string.
    pub fn load_from_str(content: &str) -> AgentResult<AgentConfig> {
        let config: AgentConfig = serde_json::from_str(content)
            .map_err(|e| AgentError::Config(format!("invalid config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply a JSON overlay on top of CLI-derived defaults: any field
    /// present in `overlay` wins, everything else keeps `base`'s value.
    pub fn merge_overlay(base: AgentConfig, overlay_json: &str) -> AgentResult<AgentConfig> {
        let mut base_value = serde_json::to_value(&base)
            .map_err(|e| AgentError::Internal(format!("config serialize failed: {e}")))?;
        let overlay_value: serde_json::Value = serde_json::from_str(overlay_json)
            .map_err(|e| AgentError::Config(format!("invalid overlay json: {e}")))?;
        merge_json(&mut base_value, overlay_value);
        let merged: AgentConfig = serde_json::from_value(base_value)
            .map_err(|e| AgentError::Config(format!("merged config invalid: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }
}

fn merge_json(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                merge_json(base_map.entry(k).or_insert(serde_json::Value::Null), v);
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AgentConfig {
        AgentConfig {
            cores: 4,
            debug_level: 1,
            task_launch_method: "fork".into(),
            mpi_launch_method: "mpirun".into(),
            lrms: LrmsKind::Fork,
            mongodb_url: "mongodb://localhost".into(),
            mongodb_name: "pilots".into(),
            mongodb_auth: None,
            spawner: SpawnerKind::Direct,
            pilot_id: "pilot-1".into(),
            agent_scheduler: SchedulerKind::Continuous,
            runtime_minutes: 30,
            session_id: "sess-1".into(),
            workers: WorkerCounts::default(),
            clone_factor: CloneFactor::default(),
            heartbeat_interval_secs: 10,
            bulk_collection_ms: 1000,
            watcher_poll_ms: 100,
        }
    }

    #[test]
    fn rejects_zero_cores() {
        let mut cfg = sample();
        cfg.cores = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overlay_replaces_scalar_fields_only() {
        let base = sample();
        let merged = ConfigLoader::merge_overlay(base.clone(), r#"{"cores": 16}"#).unwrap();
        assert_eq!(merged.cores, 16);
        assert_eq!(merged.pilot_id, base.pilot_id);
    }

    #[test]
    fn runtime_deadline_adds_minutes() {
        let cfg = sample();
        let start = chrono::Utc::now();
        let deadline = cfg.runtime_deadline(start);
        assert_eq!((deadline - start).num_seconds(), 30 * 60);
    }
}
