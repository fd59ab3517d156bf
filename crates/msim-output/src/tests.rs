//! Unit tests for the CSV backend.

use std::path::PathBuf;

use crate::csv_writer::CsvWriter;
use crate::row::{AgentSnapshotRow, TickSummaryRow};
use crate::writer::OutputWriter;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("msim-output-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn tick_summaries_round_trip() {
    let dir = scratch_dir("summary");
    let mut writer = CsvWriter::new(&dir).unwrap();
    writer
        .write_tick_summary(&TickSummaryRow {
            tick: 0,
            sim_ms: 0,
            active_agents: 3,
            pending_agents: 2,
        })
        .unwrap();
    writer
        .write_tick_summary(&TickSummaryRow {
            tick: 1,
            sim_ms: 100,
            active_agents: 4,
            pending_agents: 1,
        })
        .unwrap();
    writer.finish().unwrap();

    let text = std::fs::read_to_string(dir.join("tick_summary.csv")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "tick,sim_ms,active_agents,pending_agents");
    assert_eq!(lines[1], "0,0,3,2");
    assert_eq!(lines[2], "1,100,4,1");
}

#[test]
fn snapshots_batch_write() {
    let dir = scratch_dir("snapshots");
    let mut writer = CsvWriter::new(&dir).unwrap();
    let rows = vec![
        AgentSnapshotRow { agent_id: 1, tick: 5, x_cm: 10.0, y_cm: 0.0 },
        AgentSnapshotRow { agent_id: 2, tick: 5, x_cm: 24.5, y_cm: -3.0 },
    ];
    writer.write_snapshots(&rows).unwrap();
    writer.finish().unwrap();

    let text = std::fs::read_to_string(dir.join("agent_snapshots.csv")).unwrap();
    assert_eq!(text.lines().count(), 3, "header + 2 rows");
    assert!(text.contains("2,5,24.5,-3.0"));
}

#[test]
fn finish_is_idempotent() {
    let dir = scratch_dir("finish");
    let mut writer = CsvWriter::new(&dir).unwrap();
    writer.finish().unwrap();
    writer.finish().unwrap();
}
