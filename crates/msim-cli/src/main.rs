//! `msim` — run a simulation from a configuration document.
//!
//! ```text
//! msim path/to/config.json
//! ```
//!
//! Exit code 0 on completion, 1 on initialization or simulation failure.
//! Per-tick progress goes to the console; structured output goes to the
//! configured sinks.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rusqlite::Connection;
use tracing::info;
use tracing_subscriber::EnvFilter;

use msim_agent::Agent;
use msim_core::{SimulationConfig, Tick};
use msim_engine::{GroupKind, SimObserver, Simulation};
use msim_network::{load_network, RoadNetwork};
use msim_output::{AgentSnapshotRow, CsvWriter, OutputWriter, TickSummaryRow};
use msim_schedule::{ScheduleStore, SqliteScheduleStore};

#[derive(Parser)]
#[command(name = "msim", about = "Agent-based traffic microsimulator")]
struct Cli {
    /// Path to the JSON configuration document.
    config: PathBuf,

    /// Print a console progress line every N ticks.
    #[arg(long, default_value = "100")]
    progress_every: u64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let raw = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("read configuration {}", cli.config.display()))?;
    let config: SimulationConfig =
        serde_json::from_str(&raw).context("parse configuration document")?;
    config.validate()?;

    // ── Network and schedule store ────────────────────────────────────────
    let (network, store) = if config.database.is_empty() {
        info!("no database configured; running with an empty network");
        (Arc::new(RoadNetwork::empty()), None)
    } else {
        let conn = Connection::open(&config.database)
            .with_context(|| format!("open store {}", config.database))?;
        let network = Arc::new(load_network(&conn, &config.procedures)?);

        let store: Option<Box<dyn ScheduleStore>> =
            match config.procedures.get("day_activity_schedule") {
                Some(proc) => {
                    let conn = Connection::open(&config.database)?;
                    Some(Box::new(SqliteScheduleStore::new(conn, proc)))
                }
                None => None,
            };
        (network, store)
    };

    // ── Output sinks ──────────────────────────────────────────────────────
    let writer = match &config.output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create output directory {}", dir.display()))?;
            Some(CsvWriter::new(dir)?)
        }
        None => None,
    };

    // ── Build and run ─────────────────────────────────────────────────────
    let mut builder = Simulation::builder(config.clone()).network(network);
    if let Some(store) = store {
        builder = builder.schedule_store(store);
    }
    let mut sim = builder.build()?;

    println!(
        "msim: {} ticks at {} ms/tick, start {}",
        config.total_runtime_ticks, config.base_gran_ms, config.sim_start_time
    );

    let mut observer = ProgressObserver {
        writer,
        every: cli.progress_every.max(1),
        base_gran_ms: config.base_gran_ms,
    };
    sim.run(&mut observer)?;

    // Final position snapshot of whatever is still active.
    if let Some(writer) = &mut observer.writer {
        let final_tick = sim.clock().current_tick;
        let mut rows = Vec::new();
        sim.group(GroupKind::Agents).for_each_agent(|agent| {
            if let Some((x_cm, y_cm)) = agent.position_cm() {
                rows.push(AgentSnapshotRow {
                    agent_id: agent.id().0,
                    tick: final_tick.0,
                    x_cm,
                    y_cm,
                });
            }
        });
        writer.write_snapshots(&rows)?;
        writer.finish()?;
    }

    println!("msim: done");
    Ok(())
}

// ── Progress observer ─────────────────────────────────────────────────────────

struct ProgressObserver {
    writer: Option<CsvWriter>,
    every: u64,
    base_gran_ms: u32,
}

impl SimObserver for ProgressObserver {
    fn on_tick_end(&mut self, tick: Tick, active: usize, pending: usize) {
        if tick.0 % self.every == 0 {
            println!(
                "tick {:>8}  {:>10} ms  active={active}  pending={pending}",
                tick.0,
                tick.0 * self.base_gran_ms as u64,
            );
        }
        if let Some(writer) = &mut self.writer {
            let row = TickSummaryRow {
                tick: tick.0,
                sim_ms: tick.0 * self.base_gran_ms as u64,
                active_agents: active as u64,
                pending_agents: pending as u64,
            };
            let _ = writer.write_tick_summary(&row);
        }
    }

    fn on_sim_end(&mut self, final_tick: Tick) {
        println!("simulation complete at {final_tick}");
    }
}
