//! Presence snapshots from a live feed document, once or on an interval.
//!
//! In watch mode the model files are reloaded whenever the build manifest
//! changes, and the new models are swapped into the shared handle between
//! cycles. A live feed that fails to read is logged and skipped; the signal
//! cache keeps serving the last good values until they go stale.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use clap::Args;
use transit_safety_config::EngineConfig;
use transit_safety_live::{ComplexMap, LiveFeed, LiveSignalCache};
use transit_safety_presence::ModelHandle;
use transit_safety_presence_models::PresenceSnapshot;

/// Arguments for the `presence` subcommand.
#[derive(Args, Clone)]
pub struct PresenceArgs {
    /// Live feed JSON document
    #[arg(long)]
    pub live: PathBuf,

    /// Feed stop id to station complex mapping CSV
    #[arg(long)]
    pub complexes: Option<PathBuf>,

    /// Compute for this local time instead of now
    #[arg(long, value_parser = crate::parse_datetime)]
    pub at: Option<NaiveDateTime>,

    /// Recompute every N seconds until interrupted
    #[arg(long)]
    pub watch: Option<u64>,
}

/// Everything a presence cycle needs besides the clock.
pub struct PresenceSession {
    handle: ModelHandle,
    cache: LiveSignalCache,
    complexes: ComplexMap,
    config: EngineConfig,
    data_dir: PathBuf,
    revision: Option<String>,
}

impl PresenceSession {
    /// Loads the models from `data_dir` and the optional complex mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the models or the mapping cannot be loaded.
    pub fn open(
        config: &EngineConfig,
        data_dir: &Path,
        complexes: Option<&Path>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let revision = transit_safety_generate::manifest_revision(data_dir);
        let models = transit_safety_generate::load_models(data_dir)?;
        let complexes = match complexes {
            Some(path) => ComplexMap::from_file(path)?,
            None => {
                log::warn!(
                    "No --complexes mapping given; arrivals and alerts will not resolve to stations"
                );
                ComplexMap::default()
            }
        };

        Ok(Self {
            handle: ModelHandle::new(models),
            cache: LiveSignalCache::new(config.live.max_staleness_secs),
            complexes,
            config: config.clone(),
            data_dir: data_dir.to_path_buf(),
            revision,
        })
    }

    /// Swaps in freshly built models if the manifest changed since the last
    /// load. A failed reload keeps the current models.
    pub fn reload_if_changed(&mut self) {
        let revision = transit_safety_generate::manifest_revision(&self.data_dir);
        if revision == self.revision {
            return;
        }

        match transit_safety_generate::load_models(&self.data_dir) {
            Ok(models) => {
                let generation = self.handle.swap(models);
                log::info!("Model files changed; now serving generation {generation}");
                self.revision = revision;
            }
            Err(e) => log::warn!("Model files changed but could not be loaded: {e}"),
        }
    }

    /// Ingests the live feed at `live` (if readable) and computes presence
    /// at `now`.
    pub fn cycle(&mut self, live: &Path, now: NaiveDateTime) -> PresenceSnapshot {
        match LiveFeed::from_file(live) {
            Ok(feed) => feed.ingest(&mut self.cache, &self.complexes, now, &self.config.live),
            Err(e) => log::warn!(
                "Failed to read live feed {}: {e}; using last-known signals",
                live.display()
            ),
        }

        let signals = self.cache.snapshot(now);
        self.handle
            .load()
            .compute(&signals, now, &self.config.presence)
    }
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

fn emit(snapshot: &PresenceSnapshot, pretty: bool) -> Result<(), serde_json::Error> {
    let json = if pretty {
        serde_json::to_string_pretty(snapshot)?
    } else {
        serde_json::to_string(snapshot)?
    };
    println!("{json}");
    Ok(())
}

/// Runs the `presence` subcommand.
///
/// # Errors
///
/// Returns an error if the models cannot be loaded or a snapshot cannot be
/// encoded.
#[allow(clippy::future_not_send)]
pub async fn run(
    args: &PresenceArgs,
    config: &EngineConfig,
    data_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = PresenceSession::open(config, data_dir, args.complexes.as_deref())?;

    let Some(secs) = args.watch else {
        let snapshot = session.cycle(&args.live, args.at.unwrap_or_else(now));
        emit(&snapshot, true)?;
        return Ok(());
    };

    if args.at.is_some() {
        log::warn!("--at is ignored with --watch; cycles use the current time");
    }

    let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
    log::info!("Computing presence every {}s (Ctrl-C to stop)", secs.max(1));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                session.reload_if_changed();
                let snapshot = session.cycle(&args.live, now());
                emit(&snapshot, false)?;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Stopping");
                return Ok(());
            }
        }
    }
}
