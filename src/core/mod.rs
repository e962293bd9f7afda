//! Core functionality for the interaction recorder.
//!
//! This module contains:
//! - Flattening of page sessions into timestamp-ordered rows
//! - CSV rendering and parsing
//! - The export filename convention

pub mod export;

// Re-export commonly used types
pub use export::{
    collect_question_rows, collect_rows, export_csv, export_filename, parse_csv, render_csv,
    time_string, CsvLayout, EventType, Export, ExportError, ExportRow, HEADER, HEADER_COMPACT,
};
