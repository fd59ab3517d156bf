//! `msim-output` — structured output sinks.
//!
//! The driver's observer hands row structs to an [`OutputWriter`]; the CSV
//! backend writes one file per row type under a configured directory.
//! This crate knows nothing about the engine — it only sees rows.

pub mod csv_writer;
pub mod error;
pub mod row;
pub mod writer;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use csv_writer::CsvWriter;
pub use error::{OutputError, OutputResult};
pub use row::{AgentSnapshotRow, TickSummaryRow};
pub use writer::OutputWriter;
