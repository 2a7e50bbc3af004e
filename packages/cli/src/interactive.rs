//! Interactive menu shown when no subcommand is given.
//!
//! Prompts for the same inputs the subcommands take, so nobody has to
//! remember the flags for an occasional rebuild.

use std::path::PathBuf;

use dialoguer::{Confirm, Input, Select};
use transit_safety_cli_utils::MultiProgress;

use crate::GlobalArgs;
use crate::presence::PresenceArgs;

/// Top-level task selection.
enum Task {
    BuildAll,
    BuildRidership,
    BuildCrimeRisk,
    Presence,
    WatchPresence,
}

impl Task {
    const ALL: &[Self] = &[
        Self::BuildAll,
        Self::BuildRidership,
        Self::BuildCrimeRisk,
        Self::Presence,
        Self::WatchPresence,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::BuildAll => "Build all models",
            Self::BuildRidership => "Build ridership profiles",
            Self::BuildCrimeRisk => "Build crime risk",
            Self::Presence => "Compute presence snapshot",
            Self::WatchPresence => "Watch presence (recompute on an interval)",
        }
    }
}

fn prompt_path(prompt: &str) -> Result<PathBuf, dialoguer::Error> {
    let path: String = Input::new().with_prompt(prompt).interact_text()?;
    Ok(PathBuf::from(path.trim()))
}

fn prompt_optional_path(prompt: &str) -> Result<Option<PathBuf>, dialoguer::Error> {
    let path: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    let path = path.trim();
    Ok((!path.is_empty()).then(|| PathBuf::from(path)))
}

fn prompt_force(globals: &GlobalArgs) -> Result<bool, dialoguer::Error> {
    if globals.force {
        return Ok(true);
    }
    Confirm::new()
        .with_prompt("Force rebuild?")
        .default(false)
        .interact()
}

/// Runs the interactive menu.
///
/// # Errors
///
/// Returns an error if a prompt fails or the chosen task fails.
#[allow(clippy::future_not_send)]
pub async fn run(
    multi: &MultiProgress,
    globals: &GlobalArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Transit Safety Engine");
    println!();

    let labels: Vec<&str> = Task::ALL.iter().map(Task::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    let config = crate::load_config(globals)?;
    let data_dir = globals.data_dir();
    log::info!("Model directory: {}", data_dir.display());

    match Task::ALL[idx] {
        Task::BuildAll => {
            let ridership = prompt_path("Ridership log CSV")?;
            let incidents = prompt_path("Incident log CSV")?;
            let force = prompt_force(globals)?;
            crate::build_ridership(multi, &config, &ridership, &data_dir, force)?;
            crate::build_crime_risk(multi, &config, &incidents, None, &data_dir, force)?;
        }
        Task::BuildRidership => {
            let input = prompt_path("Ridership log CSV")?;
            let force = prompt_force(globals)?;
            crate::build_ridership(multi, &config, &input, &data_dir, force)?;
        }
        Task::BuildCrimeRisk => {
            let input = prompt_path("Incident log CSV")?;
            let force = prompt_force(globals)?;
            crate::build_crime_risk(multi, &config, &input, None, &data_dir, force)?;
        }
        Task::Presence | Task::WatchPresence => {
            let live = prompt_path("Live feed JSON")?;
            let complexes =
                prompt_optional_path("Stop to complex mapping CSV (leave empty for none)")?;
            let watch = if matches!(Task::ALL[idx], Task::WatchPresence) {
                let secs: u64 = Input::new()
                    .with_prompt("Interval (seconds)")
                    .default(30)
                    .interact_text()?;
                Some(secs)
            } else {
                None
            };

            let args = PresenceArgs {
                live,
                complexes,
                at: None,
                watch,
            };
            crate::presence::run(&args, &config, &data_dir).await?;
        }
    }

    Ok(())
}
