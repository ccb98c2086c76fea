#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Deforestation overlap by historical period.
//!
//! Buckets a deforestation polygon layer into the fixed periods of the
//! [`periods`] registry, intersects each bucket with a farm boundary layer
//! and expresses the intersected area of every period as a percentage of
//! the farm's total area.
//!
//! Areas are computed in the squared linear unit of the input coordinates
//! and divided by [`AREA_SCALE`]. No reprojection happens here.

pub mod aggregate;
pub mod normalize;
pub mod overlay;
pub mod periods;
pub mod progress;
pub mod year;

pub use aggregate::aggregate_percent;
pub use deforest_overlap_models as models;
pub use overlay::{MeasuredIntersection, intersect_and_measure};
pub use year::{YearColumn, filter_by_period};

use deforest_overlap_models::{IntersectionRecord, Layer, OverlapReport, PeriodSummary};
use thiserror::Error;

use crate::normalize::normalize_attributes;
use crate::progress::{NullProgress, ProgressCallback};

/// Divisor applied to raw geometry areas (square meters to hectares for
/// metric CRSs). Output columns keep the historical `_km` naming.
pub const AREA_SCALE: f64 = 10_000.0;

/// Errors that abort an overlap run.
#[derive(Debug, Error)]
pub enum OverlapError {
    /// The deforestation layer has no usable year column.
    #[error("No '{requested}' column found. Available columns: {available:?}")]
    MissingColumn {
        /// Column that was looked for.
        requested: String,
        /// Attribute names present on the layer.
        available: Vec<String>,
    },

    /// The farm layer has no polygonal area to divide by.
    #[error("Farm total area is {total_farm_area}; cannot compute a percentage")]
    DivisionByZero {
        /// Offending farm area (scaled).
        total_farm_area: f64,
    },
}

/// Caller-tunable options for [`process_periods_with_progress`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Explicit year column name (case-insensitive). When `None` the
    /// alias list and `year*` prefix rule apply.
    pub year_column: Option<String>,
}

/// Runs every period with default options and no progress reporting.
///
/// # Errors
///
/// See [`process_periods_with_progress`].
pub fn process_periods(deforestation: &Layer, farm: &Layer) -> Result<OverlapReport, OverlapError> {
    process_periods_with_progress(deforestation, farm, &ProcessOptions::default(), &NullProgress)
}

/// Buckets `deforestation` into the registered periods, intersects each
/// bucket with `farm` and aggregates the areas.
///
/// Rows are concatenated in period order. Every period gets a
/// [`PeriodSummary`], including periods without rows.
///
/// # Errors
///
/// * [`OverlapError::MissingColumn`] if the deforestation layer has features
///   but no year column.
/// * [`OverlapError::DivisionByZero`] if the farm layer has no polygonal area.
pub fn process_periods_with_progress(
    deforestation: &Layer,
    farm: &Layer,
    options: &ProcessOptions,
    progress: &dyn ProgressCallback,
) -> Result<OverlapReport, OverlapError> {
    let year_column = if deforestation.is_empty() {
        None
    } else {
        Some(YearColumn::for_layer(
            deforestation,
            options.year_column.as_deref(),
        )?)
    };

    let area_total_fazenda = overlay::total_area(&farm.features);
    let periods = periods::all_periods();

    log::info!(
        "Processing {} deforestation features against {} farm features (farm area {area_total_fazenda:.4})",
        deforestation.len(),
        farm.len()
    );
    if let Some(column) = &year_column {
        log::debug!("Using year column '{}'", column.name());
    }

    progress.set_total(periods.len() as u64);

    let mut records = Vec::new();
    let mut summaries = Vec::with_capacity(periods.len());

    for period in &periods {
        progress.set_message(format!("Period {}", period.label));

        let selected = year_column
            .as_ref()
            .map(|column| column.select(deforestation, period))
            .unwrap_or_default();
        let rows = intersect_and_measure(selected.iter().copied(), &farm.features);
        let (percentual, area_periodo) = aggregate_percent(&rows, area_total_fazenda)?;

        log::info!(
            "Period {}: {} features selected, {} intersections, area {area_periodo:.4} ({percentual:.2}%)",
            period.label,
            selected.len(),
            rows.len()
        );

        summaries.push(PeriodSummary {
            periodo: period.label.clone(),
            start: period.start,
            end: period.end,
            row_count: rows.len(),
            percentual,
            area_periodo,
        });

        records.extend(rows.into_iter().map(|row| IntersectionRecord {
            geometry: row.geometry,
            attributes: row.attributes,
            periodo: period.label.clone(),
            area_km: row.area_km,
            percentual,
            area_periodo,
            area_total_fazenda,
        }));

        progress.inc(1);
    }

    let before = records.len();
    records.retain(|record| !record.geometry.is_empty());
    if records.len() != before {
        log::warn!(
            "Dropped {} empty geometries from the combined table",
            before - records.len()
        );
    }

    for record in &mut records {
        normalize_attributes(&mut record.attributes);
    }

    progress.finish(format!("{} intersection rows", records.len()));

    Ok(OverlapReport {
        records,
        summaries,
        area_total_fazenda,
        crs: deforestation.crs.clone(),
    })
}
