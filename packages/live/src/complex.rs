//! Feed stop id to station complex id mapping.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::LiveError;

/// Maps raw feed stop ids onto the complex ids the profiles are keyed by.
///
/// Platform ids often carry a direction suffix (`127N`, `127S`); when the
/// exact id is unknown the suffix is stripped and the parent id tried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplexMap {
    stops: BTreeMap<String, String>,
}

impl ComplexMap {
    /// Adds a mapping.
    pub fn insert(&mut self, stop_id: impl Into<String>, complex_id: impl Into<String>) {
        self.stops.insert(stop_id.into(), complex_id.into());
    }

    /// Number of stop ids mapped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Resolves a feed stop id to its complex id.
    #[must_use]
    pub fn resolve(&self, stop_id: &str) -> Option<&str> {
        let stop_id = stop_id.trim();
        self.stops
            .get(stop_id)
            .or_else(|| {
                stop_id
                    .strip_suffix(['N', 'S'])
                    .and_then(|parent| self.stops.get(parent))
            })
            .map(String::as_str)
    }

    /// Reads `stop_id,complex_id` rows. Extra columns are ignored and rows
    /// with a blank field are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError`] if the CSV is malformed or lacks either column.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LiveError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| LiveError::MissingColumn(name.to_string()))
        };
        let stop_idx = find("stop_id")?;
        let complex_idx = find("complex_id")?;

        let mut map = Self::default();
        for record in reader.records() {
            let record = record?;
            match (record.get(stop_idx), record.get(complex_idx)) {
                (Some(stop), Some(complex)) if !stop.is_empty() && !complex.is_empty() => {
                    map.insert(stop, complex);
                }
                _ => {}
            }
        }

        log::info!("Loaded {} stop-to-complex mappings", map.len());
        Ok(map)
    }

    /// Reads the mapping from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, LiveError> {
        Self::from_reader(std::io::BufReader::new(std::fs::File::open(path)?))
    }
}
