#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for deforestation overlap analysis.
//!
//! `deforest analyze` runs the full period overlap for a deforestation
//! layer against a farm boundary layer and writes the result tables,
//! GeoJSON, map view and zipped shapefile. Without a subcommand the same
//! analysis is configured through interactive prompts.
//!
//! Logging goes through [`deforest_cli_utils::init_logger`], so `RUST_LOG`
//! controls verbosity and log lines never tear the progress bar.

mod analyze;
mod interactive;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::analyze::AnalyzeArgs;

#[derive(Parser)]
#[command(name = "deforest", about = "Deforestation overlap by historical period")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Intersect a deforestation layer with a farm layer, period by period
    Analyze {
        /// Deforestation layer: one `.geojson` file, or the `.shp`, `.shx`
        /// and `.dbf` (plus optional `.prj`/`.cpg`) of one shapefile
        #[arg(long, num_args = 1.., required = true)]
        deforestation: Vec<PathBuf>,
        /// Farm boundary layer, in the same forms as `--deforestation`
        #[arg(long, num_args = 1.., required = true)]
        farm: Vec<PathBuf>,
        /// Output directory (defaults to `DEFOREST_OUTPUT_DIR` or `data/output`)
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Name of the year attribute (case-insensitive). When omitted,
        /// `year`, `ano` or the first `year*` column is used.
        #[arg(long)]
        year_column: Option<String>,
        /// Skip writing the zipped shapefile package `resultado.zip`
        #[arg(long)]
        no_package: bool,
    },
    /// List the historical periods and their year ranges
    Periods,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = deforest_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi);
    };

    match command {
        Commands::Analyze {
            deforestation,
            farm,
            out_dir,
            year_column,
            no_package,
        } => {
            let args = AnalyzeArgs {
                deforestation,
                farm,
                out_dir: out_dir.unwrap_or_else(analyze::default_out_dir),
                year_column,
                package: !no_package,
            };
            analyze::run(&multi, &args)?;
        }
        Commands::Periods => list_periods(),
    }

    Ok(())
}

fn list_periods() {
    println!("{:<12} {:>6} {:>6}", "PERIODO", "INICIO", "FIM");
    println!("{}", "-".repeat(26));
    for period in deforest_overlap::periods::all_periods() {
        println!("{:<12} {:>6} {:>6}", period.label, period.start, period.end);
    }
}
