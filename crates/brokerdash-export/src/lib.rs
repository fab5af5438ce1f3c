//! Spreadsheet export of engagement snapshots.

pub mod csv;
pub mod error;

pub use csv::{HEADER, export_csv, parse_csv};
pub use error::{Error, Result};
