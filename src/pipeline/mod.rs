//! The multi-stage unit pipeline: Ingest → StageIn → Schedule →
//! Exec+Watch → StageOut → Update, plus the Heartbeat monitor
//! (spec.md §2, §4.5–§4.8).

pub mod exec;
pub mod heartbeat;
pub mod ingest;
pub mod stage;
pub mod update;
pub mod watcher;
