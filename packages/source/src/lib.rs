#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Readers for the historical logs consumed by the offline builders.
//!
//! The ridership log and the incident log arrive as CSV exports. Each
//! reader maps the export's column names onto the canonical
//! [`RidershipEvent`](transit_safety_station_models::RidershipEvent) and
//! [`CrimeIncident`](transit_safety_crime_models::CrimeIncident) types.
//! Rows that cannot be parsed are counted and skipped rather than failing
//! the whole load.

pub mod incidents;
pub mod parsing;
pub mod progress;
pub mod ridership;

/// Errors that can occur while reading a historical log.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV framing or decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is not present in the header row.
    #[error("Missing column '{column}' in {label} header")]
    MissingColumn {
        /// Name of the expected column.
        column: String,
        /// Which log was being read.
        label: String,
    },
}

/// Outcome of reading a log: the parsed rows and how many were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadResult<T> {
    /// Rows that parsed successfully.
    pub rows: Vec<T>,
    /// Rows skipped because a required field failed to parse.
    pub skipped: u64,
}

/// Resolves `column` against a header row, case-insensitively.
fn column_index(
    headers: &csv::StringRecord,
    column: &str,
    label: &str,
) -> Result<usize, SourceError> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(column))
        .ok_or_else(|| SourceError::MissingColumn {
            column: column.to_string(),
            label: label.to_string(),
        })
}

/// Like [`column_index`] but for columns that may be absent.
fn optional_column_index(headers: &csv::StringRecord, column: Option<&str>) -> Option<usize> {
    let column = column?;
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(column))
}
