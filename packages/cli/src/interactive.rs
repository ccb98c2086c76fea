//! Interactive prompts for the analysis.
//!
//! Collects the same inputs as `deforest analyze` through `dialoguer`,
//! then hands off to [`crate::analyze::run`].

use std::path::PathBuf;

use deforest_cli_utils::MultiProgress;
use dialoguer::{Confirm, Input};

use crate::analyze::{self, AnalyzeArgs};

/// Prompts for both layers and the output options, then runs the analysis.
///
/// # Errors
///
/// Returns an error if a prompt fails or the analysis fails.
pub fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Deforestation overlap by historical period");
    println!();

    let deforestation = prompt_files("Deforestation layer files (comma-separated)")?;
    let farm = prompt_files("Farm boundary files (comma-separated)")?;

    let out_dir: String = Input::new()
        .with_prompt("Output directory")
        .default(analyze::default_out_dir().display().to_string())
        .interact_text()?;

    let year_column: String = Input::new()
        .with_prompt("Year column (leave empty to detect)")
        .allow_empty(true)
        .interact_text()?;

    let package = Confirm::new()
        .with_prompt("Write the zipped shapefile package?")
        .default(true)
        .interact()?;

    let args = AnalyzeArgs {
        deforestation,
        farm,
        out_dir: PathBuf::from(out_dir),
        year_column: Some(year_column.trim().to_string()).filter(|name| !name.is_empty()),
        package,
    };

    let written = analyze::run(multi, &args)?;
    for path in &written {
        println!("  {}", path.display());
    }

    Ok(())
}

fn prompt_files(prompt: &str) -> Result<Vec<PathBuf>, dialoguer::Error> {
    let raw: String = Input::new()
        .with_prompt(prompt)
        .validate_with(|input: &String| -> Result<(), &str> {
            if split_paths(input).is_empty() {
                Err("At least one file is required")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    Ok(split_paths(&raw))
}

/// Splits a comma-separated path list, dropping blanks.
fn split_paths(input: &str) -> Vec<PathBuf> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}
