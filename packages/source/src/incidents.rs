//! Reader for the historical incident log.
//!
//! Police complaint exports usually split the occurrence date and time into
//! two columns, so [`IncidentColumns::time`] is optional and joined onto the
//! date when present.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use transit_safety_crime_models::CrimeIncident;

use crate::parsing::{parse_coordinate, parse_date_time};
use crate::progress::ProgressCallback;
use crate::{LoadResult, SourceError, column_index, optional_column_index};

const PROGRESS_BATCH: u64 = 10_000;

/// Column names in the incident export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IncidentColumns {
    /// Offense category column.
    pub category: String,
    /// Occurrence date (or full timestamp) column.
    pub date: String,
    /// Occurrence time column, when separate from the date.
    pub time: Option<String>,
    /// Latitude column.
    pub latitude: String,
    /// Longitude column.
    pub longitude: String,
}

impl Default for IncidentColumns {
    fn default() -> Self {
        Self {
            category: "ofns_desc".to_string(),
            date: "cmplnt_fr_dt".to_string(),
            time: Some("cmplnt_fr_tm".to_string()),
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
        }
    }
}

/// Reads incidents from CSV.
///
/// Rows with a blank category or unparseable date are skipped. Coordinates
/// are kept optional so the builder can account for dropped rows.
///
/// # Errors
///
/// Returns [`SourceError`] if the header row lacks a required column or the
/// underlying read fails. Rows that fail to decode are skipped.
pub fn read_incidents<R: Read>(
    reader: R,
    columns: &IncidentColumns,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<LoadResult<CrimeIncident>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let category_idx = column_index(&headers, &columns.category, "incident")?;
    let date_idx = column_index(&headers, &columns.date, "incident")?;
    let lat_idx = column_index(&headers, &columns.latitude, "incident")?;
    let lon_idx = column_index(&headers, &columns.longitude, "incident")?;
    let time_idx = optional_column_index(&headers, columns.time.as_deref());

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
                log::trace!("Skipping malformed incident row: {e}");
                skipped += 1;
                continue;
            }
        };

        let category = record.get(category_idx).unwrap_or_default();
        let occurred_at = record
            .get(date_idx)
            .and_then(|d| parse_date_time(d, time_idx.and_then(|i| record.get(i))));

        let (false, Some(occurred_at)) = (category.is_empty(), occurred_at) else {
            skipped += 1;
            continue;
        };

        rows.push(CrimeIncident {
            category: category.to_string(),
            occurred_at,
            latitude: record.get(lat_idx).and_then(parse_coordinate),
            longitude: record.get(lon_idx).and_then(parse_coordinate),
        });
    }

    progress.inc(seen % PROGRESS_BATCH);
    log::info!("Read {} incident rows ({skipped} skipped)", rows.len());

    Ok(LoadResult { rows, skipped })
}

/// Opens `path` and reads it with [`read_incidents`].
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be opened or parsed.
pub fn read_incidents_file(
    path: &Path,
    columns: &IncidentColumns,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<LoadResult<CrimeIncident>, SourceError> {
    log::info!("Reading incident log {}", path.display());
    let file = std::fs::File::open(path)?;
    read_incidents(std::io::BufReader::new(file), columns, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::null_progress;

    const SAMPLE: &str = "\
CMPLNT_FR_DT,CMPLNT_FR_TM,OFNS_DESC,Latitude,Longitude
01/15/2024,23:10:00,ROBBERY,40.7559,-73.9871
2024-01-16T00:00:00.000,08:05:00,FELONY ASSAULT,,
01/17/2024,,HARRASSMENT 2,40.7527,-73.9772
not a date,10:00:00,ROBBERY,40.7,-73.9
01/18/2024,10:00:00,,40.7,-73.9
";

    #[test]
    fn reads_incidents_joining_date_and_time() {
        let result =
            read_incidents(SAMPLE.as_bytes(), &IncidentColumns::default(), &null_progress())
                .unwrap();

        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.skipped, 2);

        assert_eq!(result.rows[0].category, "ROBBERY");
        assert_eq!(result.rows[0].occurred_at.to_string(), "2024-01-15 23:10:00");
        assert_eq!(result.rows[0].latitude, Some(40.7559));

        assert_eq!(result.rows[1].occurred_at.to_string(), "2024-01-16 08:05:00");
        assert!(result.rows[1].latitude.is_none());

        assert_eq!(result.rows[2].occurred_at.to_string(), "2024-01-17 00:00:00");
    }

    #[test]
    fn single_timestamp_column_without_time() {
        let columns = IncidentColumns {
            category: "category".to_string(),
            date: "occurred_at".to_string(),
            time: None,
            latitude: "lat".to_string(),
            longitude: "lon".to_string(),
        };
        let csv = "category,occurred_at,lat,lon\nROBBERY,2024-03-01,40.1,-73.1\n";
        let result = read_incidents(csv.as_bytes(), &columns, &null_progress()).unwrap();
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn undecodable_row_is_skipped_not_fatal() {
        let mut csv = b"ofns_desc,cmplnt_fr_dt,latitude,longitude\n\
ROBBERY,01/15/2024,40.7,-73.9\n"
            .to_vec();
        csv.extend_from_slice(b"BURGL\xffARY,01/16/2024,40.7,-73.9\n");
        csv.extend_from_slice(b"FELONY ASSAULT,01/17/2024,40.8,-73.8\n");

        let result =
            read_incidents(csv.as_slice(), &IncidentColumns::default(), &null_progress()).unwrap();

        assert_eq!(result.skipped, 1);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[1].category, "FELONY ASSAULT");
    }

    #[test]
    fn timestamp_with_zone_suffix_is_skipped() {
        let columns = IncidentColumns {
            time: None,
            ..IncidentColumns::default()
        };
        let csv = "ofns_desc,cmplnt_fr_dt,latitude,longitude\n\
ROBBERY,2024-03-04T08:00:00Z,40.7,-73.9\n\
ROBBERY,2024-03-04,40.7,-73.9\n";
        let result = read_incidents(csv.as_bytes(), &columns, &null_progress()).unwrap();
        assert_eq!(result.skipped, 1);
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn missing_coordinate_column_is_an_error() {
        let csv = "ofns_desc,cmplnt_fr_dt,latitude\nROBBERY,01/15/2024,40.7\n";
        let err = read_incidents(csv.as_bytes(), &IncidentColumns::default(), &null_progress())
            .unwrap_err();
        assert!(matches!(err, SourceError::MissingColumn { .. }));
    }
}
