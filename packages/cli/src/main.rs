#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the transit safety engine.
//!
//! Builds the offline models from historical logs and computes presence
//! snapshots from a live feed document. Running without a subcommand opens
//! an interactive menu.
//!
//! Uses `indicatif-log-bridge` (via [`transit_safety_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal. Presence snapshots
//! are the only thing written to stdout.

mod interactive;
mod presence;

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use transit_safety_cli_utils::{IndicatifProgress, MultiProgress};
use transit_safety_config::EngineConfig;
use transit_safety_generate::BuildOutcome;

#[derive(Parser)]
#[command(name = "transit_safety", about = "Transit station presence and safety engine")]
struct Cli {
    #[command(flatten)]
    globals: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Flags shared by every subcommand.
#[derive(Args, Clone)]
struct GlobalArgs {
    /// Engine config TOML (defaults to `$TRANSIT_SAFETY_CONFIG`, then
    /// built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the built model files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Rebuild even if the inputs have not changed
    #[arg(long, global = true)]
    force: bool,
}

impl GlobalArgs {
    fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(transit_safety_generate::output_dir)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build ridership profiles from a historical ridership CSV
    BuildRidership {
        /// Ridership log CSV
        #[arg(long)]
        input: PathBuf,
    },
    /// Build per-station crime risk from a historical incident CSV
    BuildCrimeRisk {
        /// Incident log CSV
        #[arg(long)]
        input: PathBuf,

        /// Reference time for recency decay (defaults to now)
        #[arg(long, value_parser = parse_datetime)]
        as_of: Option<NaiveDateTime>,
    },
    /// Compute a presence snapshot from a live feed document
    Presence(presence::PresenceArgs),
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, String> {
    transit_safety_source::parsing::parse_timestamp(s)
        .ok_or_else(|| format!("Unrecognized date/time '{s}'"))
}

fn load_config(globals: &GlobalArgs) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    Ok(transit_safety_config::load(globals.config.as_deref())?)
}

fn build_ridership(
    multi: &MultiProgress,
    config: &EngineConfig,
    input: &Path,
    data_dir: &Path,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let progress = IndicatifProgress::records_bar(multi, "Building ridership profiles");
    let outcome = transit_safety_generate::run_ridership(
        input,
        data_dir,
        &config.ridership_columns,
        force,
        &progress,
    )?;
    progress.finish_and_clear();
    report(transit_safety_generate::OUTPUT_RIDERSHIP, outcome);
    Ok(())
}

fn build_crime_risk(
    multi: &MultiProgress,
    config: &EngineConfig,
    input: &Path,
    as_of: Option<NaiveDateTime>,
    data_dir: &Path,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut crime_config = config.crime_risk.clone();
    crime_config.as_of = as_of.or(crime_config.as_of);

    let progress = IndicatifProgress::build_bar(multi, "Building crime risk");
    let outcome = transit_safety_generate::run_crime_risk(
        input,
        data_dir,
        &config.incident_columns,
        &crime_config,
        force,
        &progress,
    )?;
    progress.finish_and_clear();
    report(transit_safety_generate::OUTPUT_CRIME_RISK, outcome);
    Ok(())
}

fn report(output: &str, outcome: BuildOutcome) {
    match outcome {
        BuildOutcome::UpToDate => log::info!("{output} is up-to-date (use --force to rebuild)"),
        BuildOutcome::Built { stations } => log::info!("{output}: wrote {stations} stations"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = transit_safety_cli_utils::init_logger();
    let cli = Cli::parse();
    let globals = cli.globals;

    let Some(command) = cli.command else {
        return interactive::run(&multi, &globals).await;
    };

    let config = load_config(&globals)?;
    let data_dir = globals.data_dir();

    match command {
        Commands::BuildRidership { input } => {
            build_ridership(&multi, &config, &input, &data_dir, globals.force)?;
        }
        Commands::BuildCrimeRisk { input, as_of } => {
            build_crime_risk(&multi, &config, &input, as_of, &data_dir, globals.force)?;
        }
        Commands::Presence(args) => presence::run(&args, &config, &data_dir).await?,
    }

    Ok(())
}
