//! Persisted tables and rendered reports.
//!
//! `table` reads and writes aggregate tables, `generator` renders
//! comparison reports and aggregation summaries.

pub mod generator;
pub mod table;

pub use generator::{generate_json_report, generate_markdown_report, generate_summary_json};
pub use table::{persist, read_table, require_bands};
