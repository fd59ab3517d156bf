//! The `OutputWriter` trait implemented by all backends.

use crate::row::{AgentSnapshotRow, TickSummaryRow};
use crate::OutputResult;

pub trait OutputWriter {
    /// Write one tick summary row.
    fn write_tick_summary(&mut self, row: &TickSummaryRow) -> OutputResult<()>;

    /// Write a batch of agent snapshots.
    fn write_snapshots(&mut self, rows: &[AgentSnapshotRow]) -> OutputResult<()>;

    /// Flush and close all underlying files.  Idempotent.
    fn finish(&mut self) -> OutputResult<()>;
}
