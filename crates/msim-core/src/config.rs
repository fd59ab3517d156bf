//! Top-level simulation configuration.
//!
//! Loaded from a JSON document by the application crate and validated once
//! before anything is built.  Library crates receive the validated struct
//! (or the pieces of it they need) — they never re-read the document.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::time::DailyTime;
use crate::{CoreError, CoreResult};

/// Entities the persistent store can load, in the order the loader runs
/// them.  Each maps to a stored-procedure (table/view) name in
/// [`ProcedureMap`]; an empty name disables that load path.
pub const LOADABLE_ENTITIES: [&str; 10] = [
    "node",
    "section",
    "crossing",
    "lane",
    "turning",
    "polyline",
    "tripchain",
    "signal",
    "taxi_fleet",
    "day_activity_schedule",
];

/// Stored procedures that must be present for the network to load at all.
const MANDATORY_PROCEDURES: [&str; 2] = ["node", "section"];

// ── MutexStrategy ─────────────────────────────────────────────────────────────

/// Concurrency strategy for shared agent properties.
///
/// Only `Buffered` (double-buffered cells promoted at the flip barrier) is
/// implemented; the configuration surface keeps the field so documents from
/// the original tooling parse, but any other value fails validation.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutexStrategy {
    #[default]
    Buffered,
    Locked,
}

// ── WorkGroupConfig ───────────────────────────────────────────────────────────

/// Size and tick granularity of one work-group.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct WorkGroupConfig {
    /// Number of worker threads in the group.
    pub workers: usize,
    /// Group tick granularity in base ticks (1 = every tick).
    pub granularity_ticks: u64,
}

impl WorkGroupConfig {
    pub fn new(workers: usize, granularity_ticks: u64) -> Self {
        Self { workers, granularity_ticks }
    }
}

// ── ProcedureMap ──────────────────────────────────────────────────────────────

/// Logical entity name → stored-procedure name.
///
/// Absent and empty entries both disable the corresponding load path.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcedureMap(pub HashMap<String, String>);

impl ProcedureMap {
    /// The procedure name for `entity`, or `None` if that load path is
    /// disabled.
    pub fn get(&self, entity: &str) -> Option<&str> {
        match self.0.get(entity).map(String::as_str) {
            Some("") | None => None,
            Some(name) => Some(name),
        }
    }
}

// ── SimulationConfig ──────────────────────────────────────────────────────────

/// Everything the driver needs to build and run one simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Milliseconds of simulated time per base tick.
    pub base_gran_ms: u32,

    /// Total base ticks to simulate.
    pub total_runtime_ticks: u64,

    /// Ticks before statistics output begins.
    #[serde(default)]
    pub total_warmup_ticks: u64,

    /// Wall-clock time of day at tick 0, `HH:MM:SS`.
    #[serde(default = "default_start_time")]
    pub sim_start_time: String,

    /// Master RNG seed; the same seed and worker layout reproduce a run.
    #[serde(default)]
    pub seed: u64,

    /// When set, agents created with future start times are stashed in the
    /// pending queue and dispatched at their start tick.  When clear, an
    /// agent updated before its start time is a fatal scheduling error.
    #[serde(default = "default_true")]
    pub dynamic_dispatch: bool,

    /// Re-raise role failures instead of converting them to removal.
    /// Debugging aid only.
    #[serde(default)]
    pub strict_agent_errors: bool,

    #[serde(default)]
    pub mutex_strategy: MutexStrategy,

    /// Path (or connection string) of the persistent store.
    #[serde(default)]
    pub database: String,

    /// Seconds of simulated time between periodic schedule loads.
    #[serde(default = "default_load_interval")]
    pub load_interval_secs: u32,

    pub agents_workgroup: WorkGroupConfig,
    pub signals_workgroup: WorkGroupConfig,
    pub shortest_path_workgroup: WorkGroupConfig,

    #[serde(default)]
    pub procedures: ProcedureMap,

    /// Directory for structured output sinks; `None` disables them.
    #[serde(default)]
    pub output_dir: Option<std::path::PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_load_interval() -> u32 {
    3_600
}

fn default_start_time() -> String {
    "03:00:00".to_owned()
}

impl SimulationConfig {
    /// Validate cross-field constraints; returns `ConfigInvalid` errors.
    pub fn validate(&self) -> CoreResult<()> {
        if self.base_gran_ms == 0 {
            return Err(CoreError::Config("base_gran_ms must be > 0".into()));
        }
        if self.mutex_strategy != MutexStrategy::Buffered {
            return Err(CoreError::Config(
                "only the \"buffered\" mutex strategy is supported".into(),
            ));
        }
        for group in [
            ("agents", &self.agents_workgroup),
            ("signals", &self.signals_workgroup),
            ("shortest_path", &self.shortest_path_workgroup),
        ] {
            let (name, cfg) = group;
            if cfg.workers == 0 {
                return Err(CoreError::Config(format!(
                    "workgroup {name:?} must have at least one worker"
                )));
            }
            if cfg.granularity_ticks == 0 {
                return Err(CoreError::Config(format!(
                    "workgroup {name:?} granularity must be >= 1 tick"
                )));
            }
        }
        if !self.database.is_empty() {
            for entity in MANDATORY_PROCEDURES {
                if self.procedures.get(entity).is_none() {
                    return Err(CoreError::Config(format!(
                        "missing mandatory stored procedure for {entity:?}"
                    )));
                }
            }
        }
        self.start_time()?;
        Ok(())
    }

    /// Parsed `sim_start_time`.
    pub fn start_time(&self) -> CoreResult<DailyTime> {
        DailyTime::parse(&self.sim_start_time)
    }

    /// Simulated milliseconds covered by the whole run.
    pub fn total_runtime_ms(&self) -> u64 {
        self.total_runtime_ticks * self.base_gran_ms as u64
    }
}
