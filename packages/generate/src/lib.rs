#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Offline model builds.
//!
//! Reads the historical ridership and incident logs, runs the two builders,
//! and writes the resulting models as JSON into an output directory.
//!
//! Supports checksum-based caching: a manifest file records, per output, a
//! SHA-256 fingerprint of everything that went into it (input bytes, column
//! mapping, builder config). An output whose fingerprint still matches and
//! whose file is still on disk is not rebuilt unless forced.

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter, Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest as _, Sha256};
use transit_safety_crime_models::{CrimeRiskConfig, StationCrimeRisk};
use transit_safety_crime_risk::{CrimeRiskError, build_crime_risk_with_progress};
use transit_safety_presence::ModelSnapshot;
use transit_safety_ridership::build_ridership_profiles_with_progress;
use transit_safety_source::SourceError;
use transit_safety_source::incidents::{IncidentColumns, read_incidents_file};
use transit_safety_source::progress::ProgressCallback;
use transit_safety_source::ridership::{RidershipColumns, read_ridership_file};
use transit_safety_station_models::{Station, StationProfile};

/// Current manifest schema version. Bump this when the manifest format
/// changes in a backward-incompatible way.
const MANIFEST_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";

/// Output name for the ridership profile model.
pub const OUTPUT_RIDERSHIP: &str = "ridership_profiles";

/// Output name for the crime risk model.
pub const OUTPUT_CRIME_RISK: &str = "crime_risk";

/// Errors that can occur during a model build.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// I/O error (file read or write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A model file could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A historical log could not be read.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The crime risk build failed.
    #[error(transparent)]
    CrimeRisk(#[from] CrimeRiskError),

    /// A model that this step depends on has not been built.
    #[error("Model file {} not found; build it first", .0.display())]
    MissingModel(PathBuf),
}

/// What a build step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The stored output already matched its inputs.
    UpToDate,
    /// The output was rebuilt.
    Built {
        /// Stations in the written model.
        stations: usize,
    },
}

/// Fingerprint and build time of one output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct OutputRecord {
    fingerprint: String,
    /// RFC 3339 timestamp of the last successful build.
    generated_at: String,
}

/// Build manifest stored at `<dir>/manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    version: u32,
    /// Successful builds recorded in this directory, forced ones included.
    #[serde(default)]
    builds: u64,
    outputs: BTreeMap<String, OutputRecord>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            builds: 0,
            outputs: BTreeMap::new(),
        }
    }
}

/// Returns the default model directory, `data/generated` under the
/// workspace root.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR` so the path does not
/// depend on the caller's working directory.
#[must_use]
pub fn output_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap_or_else(|| Path::new("."))
        .join("data/generated")
}

/// Returns the file path for a given output name.
#[must_use]
pub fn output_file_path(dir: &Path, output_name: &str) -> PathBuf {
    dir.join(format!("{output_name}.json"))
}

/// Builds the ridership profile model from the log at `input`.
///
/// # Errors
///
/// Returns [`GenerateError`] if the log cannot be read or the model cannot
/// be written.
pub fn run_ridership(
    input: &Path,
    dir: &Path,
    columns: &RidershipColumns,
    force: bool,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<BuildOutcome, GenerateError> {
    let mut fingerprint = Fingerprint::new();
    fingerprint.file(input)?;
    fingerprint.json(columns)?;
    let fingerprint = fingerprint.finish();

    let mut manifest = load_manifest(dir).unwrap_or_default();
    if !output_needs_regen(&manifest, dir, OUTPUT_RIDERSHIP, &fingerprint, force) {
        log::info!("{OUTPUT_RIDERSHIP}: up-to-date, skipping");
        return Ok(BuildOutcome::UpToDate);
    }
    log::info!("{OUTPUT_RIDERSHIP}: needs regeneration");

    let start = Instant::now();
    let events = read_ridership_file(input, columns, progress)?;
    let (profiles, stats) = build_ridership_profiles_with_progress(&events.rows, progress);

    std::fs::create_dir_all(dir)?;
    write_json(&output_file_path(dir, OUTPUT_RIDERSHIP), &profiles)?;
    record_output(&mut manifest, OUTPUT_RIDERSHIP, fingerprint);
    save_manifest(dir, &manifest)?;

    log::info!(
        "Built {} ridership profiles from {} events ({} skipped rows, {} bad coordinates, {} bad counts) in {:.2?}",
        profiles.len(),
        stats.used,
        events.skipped,
        stats.dropped_coordinates,
        stats.dropped_counts,
        start.elapsed(),
    );

    Ok(BuildOutcome::Built {
        stations: profiles.len(),
    })
}

/// Builds the crime risk model from the incident log at `input`.
///
/// Stations are taken from the ridership profile model in `dir`, so that
/// model must be built first. Its fingerprint feeds this one, so rebuilding
/// the profiles invalidates the crime risk model.
///
/// # Errors
///
/// * [`GenerateError::MissingModel`] if the ridership model is absent
/// * [`GenerateError::CrimeRisk`] if no incident survives filtering
/// * other [`GenerateError`] variants for I/O and decode failures
pub fn run_crime_risk(
    input: &Path,
    dir: &Path,
    columns: &IncidentColumns,
    config: &CrimeRiskConfig,
    force: bool,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<BuildOutcome, GenerateError> {
    let profiles_path = output_file_path(dir, OUTPUT_RIDERSHIP);
    if !profiles_path.exists() {
        return Err(GenerateError::MissingModel(profiles_path));
    }

    let mut fingerprint = Fingerprint::new();
    fingerprint.file(input)?;
    fingerprint.file(&profiles_path)?;
    fingerprint.json(columns)?;
    // The worker count never changes the output.
    fingerprint.json(&CrimeRiskConfig {
        workers: None,
        ..config.clone()
    })?;
    if let Some(as_of) = config.as_of {
        fingerprint.bytes(as_of.to_string().as_bytes());
    }
    let fingerprint = fingerprint.finish();

    let mut manifest = load_manifest(dir).unwrap_or_default();
    if !output_needs_regen(&manifest, dir, OUTPUT_CRIME_RISK, &fingerprint, force) {
        log::info!("{OUTPUT_CRIME_RISK}: up-to-date, skipping");
        return Ok(BuildOutcome::UpToDate);
    }
    log::info!("{OUTPUT_CRIME_RISK}: needs regeneration");

    let start = Instant::now();
    let profiles: BTreeMap<String, StationProfile> = read_json(&profiles_path)?;
    let stations: Vec<Station> = profiles.into_values().map(|p| p.station).collect();
    let incidents = read_incidents_file(input, columns, progress)?;
    let (risk, stats) =
        build_crime_risk_with_progress(&stations, &incidents.rows, config, progress)?;

    write_json(&output_file_path(dir, OUTPUT_CRIME_RISK), &risk)?;
    record_output(&mut manifest, OUTPUT_CRIME_RISK, fingerprint);
    save_manifest(dir, &manifest)?;

    log::info!(
        "Built crime risk for {} stations from {} incidents ({} skipped rows, {} off-category, {} bad coordinates, {} unmatched) in {:.2?}",
        risk.len(),
        stats.incidents,
        incidents.skipped,
        stats.dropped_category,
        stats.dropped_coordinates,
        stats.unmatched,
        start.elapsed(),
    );

    Ok(BuildOutcome::Built {
        stations: risk.len(),
    })
}

/// Loads both models from `dir` into a generation-zero snapshot.
///
/// The crime risk model is optional; without it every station reads as
/// zero risk.
///
/// # Errors
///
/// Returns [`GenerateError::MissingModel`] if the ridership model is absent,
/// or another [`GenerateError`] if a model file cannot be decoded.
pub fn load_models(dir: &Path) -> Result<ModelSnapshot, GenerateError> {
    let profiles_path = output_file_path(dir, OUTPUT_RIDERSHIP);
    if !profiles_path.exists() {
        return Err(GenerateError::MissingModel(profiles_path));
    }
    let profiles: BTreeMap<String, StationProfile> = read_json(&profiles_path)?;

    let risk_path = output_file_path(dir, OUTPUT_CRIME_RISK);
    let crime_risk: BTreeMap<String, StationCrimeRisk> = if risk_path.exists() {
        read_json(&risk_path)?
    } else {
        log::warn!(
            "{} not found; all stations will read as zero crime risk",
            risk_path.display()
        );
        BTreeMap::new()
    };

    log::info!(
        "Loaded models: {} profiles, {} crime risk entries",
        profiles.len(),
        crime_risk.len()
    );
    Ok(ModelSnapshot::new(profiles, crime_risk))
}

/// Returns a token that changes whenever a build updates the manifest in
/// `dir`, or `None` when there is no manifest.
///
/// Forced rebuilds change the token even when every input fingerprint is
/// unchanged.
#[must_use]
pub fn manifest_revision(dir: &Path) -> Option<String> {
    let manifest = load_manifest(dir)?;
    let outputs = manifest
        .outputs
        .iter()
        .map(|(name, record)| format!("{name}={}", record.fingerprint))
        .collect::<Vec<_>>()
        .join(",");
    Some(format!("{}:{outputs}", manifest.builds))
}

/// Incremental SHA-256 over build inputs.
struct Fingerprint(Sha256);

impl Fingerprint {
    fn new() -> Self {
        Self(Sha256::new())
    }

    fn bytes(&mut self, bytes: &[u8]) {
        // Length prefix keeps adjacent inputs from running together.
        self.0.update((bytes.len() as u64).to_le_bytes());
        self.0.update(bytes);
    }

    fn file(&mut self, path: &Path) -> Result<(), GenerateError> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        self.bytes(&hasher.finalize());
        Ok(())
    }

    fn json<T: Serialize>(&mut self, value: &T) -> Result<(), GenerateError> {
        self.bytes(&serde_json::to_vec(value)?);
        Ok(())
    }

    fn finish(self) -> String {
        hex::encode(self.0.finalize())
    }
}

/// Loads the manifest from `dir/manifest.json`.
///
/// Returns `None` if the file does not exist or cannot be parsed.
fn load_manifest(dir: &Path) -> Option<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let Ok(contents) = std::fs::read_to_string(&path) else {
        log::debug!("No existing manifest at {}", path.display());
        return None;
    };
    match serde_json::from_str(&contents) {
        Ok(m) => Some(m),
        Err(e) => {
            log::warn!("Failed to parse manifest {}: {e}", path.display());
            None
        }
    }
}

/// Writes the manifest to `dir/manifest.json`.
fn save_manifest(dir: &Path, manifest: &Manifest) -> Result<(), GenerateError> {
    write_json(&dir.join(MANIFEST_FILE), manifest)?;
    log::debug!("Saved manifest to {}", dir.join(MANIFEST_FILE).display());
    Ok(())
}

/// Records a successful build in the manifest.
fn record_output(manifest: &mut Manifest, output_name: &str, fingerprint: String) {
    manifest.version = MANIFEST_VERSION;
    manifest.builds += 1;
    manifest.outputs.insert(
        output_name.to_string(),
        OutputRecord {
            fingerprint,
            generated_at: chrono::Utc::now().to_rfc3339(),
        },
    );
}

/// Determines whether an output needs rebuilding.
///
/// Returns `true` if any of: `force` is set, manifest version mismatch,
/// output not recorded, fingerprint changed, or output file missing.
fn output_needs_regen(
    manifest: &Manifest,
    dir: &Path,
    output_name: &str,
    fingerprint: &str,
    force: bool,
) -> bool {
    if force || manifest.version != MANIFEST_VERSION {
        return true;
    }

    let Some(record) = manifest.outputs.get(output_name) else {
        return true;
    };

    record.fingerprint != fingerprint || !output_file_path(dir, output_name).exists()
}

/// Writes `value` as pretty JSON.
///
/// Uses an atomic write pattern (write to `.tmp`, then rename) so an
/// interrupted build never leaves a truncated model behind.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), GenerateError> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut writer = BufWriter::new(std::fs::File::create(&tmp_path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, GenerateError> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
