//! The `analyze` command: load, process, report and write outputs.

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::time::Instant;

use deforest_cli_utils::{IndicatifProgress, MultiProgress};
use deforest_export::{MapView, to_feature_collection, write_csv, write_package, write_summary_csv};
use deforest_overlap::models::{Layer, OverlapReport};
use deforest_overlap::{ProcessOptions, periods, process_periods_with_progress};

/// Environment variable overriding the default output directory.
pub const OUTPUT_DIR_ENV: &str = "DEFOREST_OUTPUT_DIR";

const FALLBACK_OUTPUT_DIR: &str = "data/output";

/// Fully resolved inputs of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    pub deforestation: Vec<PathBuf>,
    pub farm: Vec<PathBuf>,
    pub out_dir: PathBuf,
    pub year_column: Option<String>,
    pub package: bool,
}

/// Output directory used when none is given.
#[must_use]
pub fn default_out_dir() -> PathBuf {
    std::env::var_os(OUTPUT_DIR_ENV)
        .filter(|value| !value.is_empty())
        .map_or_else(|| PathBuf::from(FALLBACK_OUTPUT_DIR), PathBuf::from)
}

/// Runs one analysis and returns the paths of the files written.
///
/// # Errors
///
/// Returns an error if either layer fails to load, the overlap fails
/// (missing year column, zero farm area) or an output cannot be written.
pub fn run(
    multi: &MultiProgress,
    args: &AnalyzeArgs,
) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let start = Instant::now();

    let deforestation = deforest_layer::load_layer(&args.deforestation)?;
    let farm = deforest_layer::load_layer(&args.farm)?;

    if farm.is_empty() {
        log::warn!("The farm layer has no features");
    }

    let options = ProcessOptions {
        year_column: args.year_column.clone(),
    };
    let progress =
        IndicatifProgress::steps_bar(multi, "Periods", periods::all_periods().len() as u64);
    let report =
        process_periods_with_progress(&deforestation, &farm, &options, progress.as_ref())?;

    print_summary(&report);

    if report.is_empty() {
        log::warn!("No deforestation polygon intersects the farm in any period");
    }

    let written = write_outputs(&report, &farm, &args.out_dir, args.package)?;

    log::info!(
        "Wrote {} files to {} in {:.1}s",
        written.len(),
        args.out_dir.display(),
        start.elapsed().as_secs_f64()
    );

    Ok(written)
}

fn print_summary(report: &OverlapReport) {
    println!();
    println!(
        "{:<12} {:>6} {:>14} {:>12}",
        "PERIODO", "LINHAS", "AREA_PERIODO", "PERCENTUAL"
    );
    println!("{}", "-".repeat(47));
    for summary in &report.summaries {
        println!(
            "{:<12} {:>6} {:>14.4} {:>11.2}%",
            summary.periodo, summary.row_count, summary.area_periodo, summary.percentual
        );
    }
    println!("Area total da fazenda: {:.4}", report.area_total_fazenda);
    println!();
}

/// Writes every output of `report` into `out_dir`.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or any file fails
/// to serialize or write.
pub fn write_outputs(
    report: &OverlapReport,
    farm: &Layer,
    out_dir: &Path,
    package: bool,
) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();

    let csv_path = out_dir.join("resultado.csv");
    write_csv(report, BufWriter::new(File::create(&csv_path)?))?;
    written.push(csv_path);

    let summary_path = out_dir.join("resumo.csv");
    write_summary_csv(report, BufWriter::new(File::create(&summary_path)?))?;
    written.push(summary_path);

    let geojson_path = out_dir.join("resultado.geojson");
    let mut geojson = BufWriter::new(File::create(&geojson_path)?);
    serde_json::to_writer(&mut geojson, &to_feature_collection(report))?;
    geojson.flush()?;
    written.push(geojson_path);

    let map_path = out_dir.join("mapa.json");
    std::fs::write(&map_path, MapView::build(report, farm).to_json()?)?;
    written.push(map_path);

    if package {
        let zip_path = out_dir.join("resultado.zip");
        let bytes = write_package(report, &zip_path)?;
        log::debug!("Package is {bytes} bytes");
        written.push(zip_path);
    }

    for path in &written {
        log::info!("Wrote {}", path.display());
    }

    Ok(written)
}
