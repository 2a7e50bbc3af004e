#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Engine configuration.
//!
//! Every tunable lives in one [`EngineConfig`] read from TOML. All sections
//! and keys are optional; missing ones take the built-in defaults, which
//! are mirrored in the checked-in `config/default.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use transit_safety_crime_models::CrimeRiskConfig;
use transit_safety_live::LiveConfig;
use transit_safety_presence_models::PresenceConfig;
use transit_safety_source::incidents::IncidentColumns;
use transit_safety_source::ridership::RidershipColumns;

/// Environment variable naming a config file when none is passed.
pub const CONFIG_ENV_VAR: &str = "TRANSIT_SAFETY_CONFIG";

/// The checked-in default configuration.
pub const DEFAULT_TOML: &str = include_str!("../../../config/default.toml");

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has the wrong shape.
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Crime risk builder settings.
    pub crime_risk: CrimeRiskConfig,
    /// Presence computation settings.
    pub presence: PresenceConfig,
    /// Live adapter settings.
    pub live: LiveConfig,
    /// Column names in the ridership export.
    pub ridership_columns: RidershipColumns,
    /// Column names in the incident export.
    pub incident_columns: IncidentColumns,
}

impl EngineConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is malformed.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::de::from_str(toml_str)?)
    }

    /// The configuration embedded at compile time.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (this is a compile-time
    /// guarantee since the file is embedded and covered by tests).
    #[must_use]
    pub fn embedded() -> Self {
        Self::parse(DEFAULT_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse embedded default.toml: {e}"))
    }
}

/// Loads configuration from `path`, else from the file named by
/// [`CONFIG_ENV_VAR`], else the embedded `config/default.toml`.
///
/// # Errors
///
/// Returns [`ConfigError`] if a named file cannot be read or parsed.
pub fn load(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let from_env = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
    let Some(path) = path.map(Path::to_path_buf).or(from_env) else {
        log::debug!("No config file given; using embedded defaults");
        return Ok(EngineConfig::embedded());
    };

    log::info!("Loading config from {}", path.display());
    let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    EngineConfig::parse(&contents)
}
