//! Reader for the hourly ridership log.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use transit_safety_station_models::RidershipEvent;

use crate::parsing::{parse_coordinate, parse_count, parse_timestamp};
use crate::progress::ProgressCallback;
use crate::{LoadResult, SourceError, column_index, optional_column_index};

/// Number of rows between progress updates.
const PROGRESS_BATCH: u64 = 10_000;

/// Column names in the ridership export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RidershipColumns {
    /// Station complex id column.
    pub station_id: String,
    /// Station display name column.
    pub station_name: String,
    /// Observation timestamp column.
    pub timestamp: String,
    /// Rider count column.
    pub rider_count: String,
    /// Latitude column, if the export has one.
    pub latitude: Option<String>,
    /// Longitude column, if the export has one.
    pub longitude: Option<String>,
}

impl Default for RidershipColumns {
    fn default() -> Self {
        Self {
            station_id: "station_complex_id".to_string(),
            station_name: "station_complex".to_string(),
            timestamp: "transit_timestamp".to_string(),
            rider_count: "ridership".to_string(),
            latitude: Some("latitude".to_string()),
            longitude: Some("longitude".to_string()),
        }
    }
}

/// Reads ridership events from CSV.
///
/// Rows with a blank station id, an unparseable timestamp, or an invalid
/// rider count are skipped. Coordinates are passed through as-is; the
/// profile builder decides what counts as usable.
///
/// # Errors
///
/// Returns [`SourceError`] if the header row lacks a required column or the
/// underlying read fails. Rows that fail to decode are skipped.
pub fn read_ridership<R: Read>(
    reader: R,
    columns: &RidershipColumns,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<LoadResult<RidershipEvent>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let station_id_idx = column_index(&headers, &columns.station_id, "ridership")?;
    let timestamp_idx = column_index(&headers, &columns.timestamp, "ridership")?;
    let count_idx = column_index(&headers, &columns.rider_count, "ridership")?;
    let name_idx = optional_column_index(&headers, Some(columns.station_name.as_str()));
    let lat_idx = optional_column_index(&headers, columns.latitude.as_deref());
    let lon_idx = optional_column_index(&headers, columns.longitude.as_deref());

    let mut rows = Vec::new();
    let mut skipped = 0u64;
    let mut seen = 0u64;

    for record in reader.records() {
        seen += 1;
        if seen % PROGRESS_BATCH == 0 {
            progress.inc(PROGRESS_BATCH);
        }

        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                log::trace!("Skipping malformed ridership row: {e}");
                skipped += 1;
                continue;
            }
        };

        let station_id = record.get(station_id_idx).unwrap_or_default();
        let timestamp = record.get(timestamp_idx).and_then(parse_timestamp);
        let rider_count = record.get(count_idx).and_then(parse_count);

        let (false, Some(timestamp), Some(rider_count)) =
            (station_id.is_empty(), timestamp, rider_count)
        else {
            skipped += 1;
            continue;
        };

        rows.push(RidershipEvent {
            station_id: station_id.to_string(),
            station_name: name_idx
                .and_then(|i| record.get(i))
                .unwrap_or(station_id)
                .to_string(),
            timestamp,
            rider_count,
            latitude: lat_idx.and_then(|i| record.get(i)).and_then(parse_coordinate),
            longitude: lon_idx.and_then(|i| record.get(i)).and_then(parse_coordinate),
        });
    }

    progress.inc(seen % PROGRESS_BATCH);
    log::info!(
        "Read {} ridership rows ({skipped} skipped)",
        rows.len()
    );

    Ok(LoadResult { rows, skipped })
}

/// Opens `path` and reads it with [`read_ridership`].
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be opened or parsed.
pub fn read_ridership_file(
    path: &Path,
    columns: &RidershipColumns,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<LoadResult<RidershipEvent>, SourceError> {
    log::info!("Reading ridership log {}", path.display());
    let file = std::fs::File::open(path)?;
    read_ridership(std::io::BufReader::new(file), columns, progress)
}
