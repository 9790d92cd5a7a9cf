//! Bootstrap binary: CLI parsing, tracing setup, and process exit codes.
//! Everything here is explicitly out of the core's scope (spec.md §1) —
//! it only assembles an [`AgentConfig`] and hands off to [`pilot_agent::Agent`].

use clap::Parser;
use pilot_agent::config::{AgentConfig, CloneFactor, ConfigLoader, LrmsKind, SchedulerKind, SpawnerKind, WorkerCounts};
use pilot_agent::store::MockStore;
use pilot_agent::Agent;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "pilot-agent", about = "On-node pilot agent")]
struct Cli {
    #[arg(long, env = "PILOT_CORES")]
    cores: u32,

    #[arg(long, env = "PILOT_DEBUG_LEVEL", default_value_t = 0)]
    debug_level: u8,

    #[arg(long, env = "PILOT_TASK_LAUNCH_METHOD")]
    task_launch_method: String,

    #[arg(long, env = "PILOT_MPI_LAUNCH_METHOD")]
    mpi_launch_method: String,

    #[arg(long, env = "PILOT_LRMS", value_enum)]
    lrms: CliLrms,

    #[arg(long, env = "PILOT_MONGODB_URL")]
    mongodb_url: String,

    #[arg(long, env = "PILOT_MONGODB_NAME")]
    mongodb_name: String,

    #[arg(long, env = "PILOT_MONGODB_AUTH")]
    mongodb_auth: Option<String>,

    #[arg(long, env = "PILOT_SPAWNER", value_enum, default_value_t = CliSpawner::Direct)]
    spawner: CliSpawner,

    #[arg(long, env = "PILOT_ID")]
    pilot_id: String,

    #[arg(long, env = "PILOT_AGENT_SCHEDULER", value_enum, default_value_t = CliScheduler::Continuous)]
    agent_scheduler: CliScheduler,

    #[arg(long, env = "PILOT_RUNTIME")]
    runtime: u64,

    #[arg(long, env = "PILOT_SESSION_ID")]
    session_id: String,

    /// Optional JSON config overlay applied on top of the CLI-derived base.
    #[arg(long)]
    config_overlay: Option<PathBuf>,

    /// Local staging area for LINK/COPY/MOVE directives.
    #[arg(long, default_value = "./staging")]
    staging_area: PathBuf,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CliLrms {
    Torque,
    Pbspro,
    Slurm,
    Sge,
    Lsf,
    Loadleveler,
    Fork,
}

impl From<CliLrms> for LrmsKind {
    fn from(v: CliLrms) -> Self {
        match v {
            CliLrms::Torque => LrmsKind::Torque,
            CliLrms::Pbspro => LrmsKind::Pbspro,
            CliLrms::Slurm => LrmsKind::Slurm,
            CliLrms::Sge => LrmsKind::Sge,
            CliLrms::Lsf => LrmsKind::Lsf,
            CliLrms::Loadleveler => LrmsKind::Loadleveler,
            CliLrms::Fork => LrmsKind::Fork,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CliSpawner {
    Direct,
    ShellSpawner,
}

impl From<CliSpawner> for SpawnerKind {
    fn from(v: CliSpawner) -> Self {
        match v {
            CliSpawner::Direct => SpawnerKind::Direct,
            CliSpawner::ShellSpawner => SpawnerKind::ShellSpawner,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CliScheduler {
    Continuous,
    Torus,
}

impl From<CliScheduler> for SchedulerKind {
    fn from(v: CliScheduler) -> Self {
        match v {
            CliScheduler::Continuous => SchedulerKind::Continuous,
            CliScheduler::Torus => SchedulerKind::Torus,
        }
    }
}

/// Config errors exit 1, SIGINT exits 2, SIGALRM exits 3, anything else
/// uncaught exits >=6 (spec.md §6).
const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_SIGINT: u8 = 2;
const EXIT_INTERNAL: u8 = 6;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(match cli.debug_level {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let base = AgentConfig {
        cores: cli.cores,
        debug_level: cli.debug_level,
        task_launch_method: cli.task_launch_method,
        mpi_launch_method: cli.mpi_launch_method,
        lrms: cli.lrms.into(),
        mongodb_url: cli.mongodb_url,
        mongodb_name: cli.mongodb_name,
        mongodb_auth: cli.mongodb_auth,
        spawner: cli.spawner.into(),
        pilot_id: cli.pilot_id,
        agent_scheduler: cli.agent_scheduler.into(),
        runtime_minutes: cli.runtime,
        session_id: cli.session_id,
        workers: WorkerCounts::default(),
        clone_factor: CloneFactor::default(),
        heartbeat_interval_secs: 10,
        bulk_collection_ms: 1000,
        watcher_poll_ms: 100,
    };

    let config = match cli.config_overlay {
        Some(path) => match std::fs::read_to_string(&path).map_err(|e| e.to_string()).and_then(|s| ConfigLoader::merge_overlay(base, &s).map_err(|e| e.to_string())) {
            Ok(c) => c,
            Err(err) => {
                tracing::error!(error = %err, "failed to apply config overlay");
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        },
        None => match base.validate() {
            Ok(()) => base,
            Err(err) => {
                tracing::error!(error = %err, "invalid configuration");
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        },
    };

    // Store wiring is explicitly out of the core's scope (spec.md §1); the
    // bootstrap binary uses the in-memory store until a real metadata-store
    // adapter is plugged in here.
    let store = Arc::new(MockStore::default());

    let agent = match Agent::new(config, store.clone(), store, cli.staging_area) {
        Ok(agent) => agent,
        Err(err) => {
            tracing::error!(error = %err, "failed to construct agent");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let result = tokio::select! {
        res = agent.run() => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, stopping");
            return ExitCode::from(EXIT_SIGINT);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "agent stopped with an error");
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}
