//! CSV backend: one file per row type under the output directory.

use std::fs::File;
use std::path::Path;

use csv::Writer;

use crate::row::{AgentSnapshotRow, TickSummaryRow};
use crate::writer::OutputWriter;
use crate::OutputResult;

pub struct CsvWriter {
    tick_summary: Option<Writer<File>>,
    snapshots: Option<Writer<File>>,
}

impl CsvWriter {
    /// Create `tick_summary.csv` and `agent_snapshots.csv` in `dir`
    /// (which must exist).
    pub fn new(dir: &Path) -> OutputResult<Self> {
        Ok(Self {
            tick_summary: Some(Writer::from_writer(File::create(
                dir.join("tick_summary.csv"),
            )?)),
            snapshots: Some(Writer::from_writer(File::create(
                dir.join("agent_snapshots.csv"),
            )?)),
        })
    }
}

impl OutputWriter for CsvWriter {
    fn write_tick_summary(&mut self, row: &TickSummaryRow) -> OutputResult<()> {
        if let Some(writer) = &mut self.tick_summary {
            writer.serialize(row)?;
        }
        Ok(())
    }

    fn write_snapshots(&mut self, rows: &[AgentSnapshotRow]) -> OutputResult<()> {
        if let Some(writer) = &mut self.snapshots {
            for row in rows {
                writer.serialize(row)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if let Some(mut writer) = self.tick_summary.take() {
            writer.flush()?;
        }
        if let Some(mut writer) = self.snapshots.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for CsvWriter {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
