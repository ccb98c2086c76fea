//! Tabular CSV output.

use std::io::Write;

use deforest_overlap_models::OverlapReport;

use crate::ExportError;

/// Derived columns appended after the attribute columns, in order.
pub const DERIVED_COLUMNS: &[&str] = &[
    "periodo",
    "area_km",
    "percentual",
    "area_periodo",
    "area_total_fazenda",
];

/// Columns of the per-period summary table.
pub const SUMMARY_COLUMNS: &[&str] = &[
    "periodo",
    "ano_inicio",
    "ano_fim",
    "linhas",
    "percentual",
    "area_periodo",
    "area_total_fazenda",
];

/// Writes one CSV row per intersection record. Geometry is dropped;
/// attribute columns come first, in the order they appear on the records,
/// then [`DERIVED_COLUMNS`].
///
/// # Errors
///
/// Returns [`ExportError::Csv`] if writing fails.
pub fn write_csv<W: Write>(report: &OverlapReport, writer: W) -> Result<(), ExportError> {
    let mut csv = csv::Writer::from_writer(writer);
    let columns = report.attribute_columns();

    let header: Vec<&str> = columns
        .iter()
        .map(String::as_str)
        .chain(DERIVED_COLUMNS.iter().copied())
        .collect();
    csv.write_record(&header)?;

    for record in &report.records {
        let mut row: Vec<String> = columns
            .iter()
            .map(|column| {
                record
                    .attributes
                    .get(column)
                    .map(ToString::to_string)
                    .unwrap_or_default()
            })
            .collect();
        row.push(record.periodo.clone());
        row.push(record.area_km.to_string());
        row.push(record.percentual.to_string());
        row.push(record.area_periodo.to_string());
        row.push(record.area_total_fazenda.to_string());
        csv.write_record(&row)?;
    }

    csv.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Writes one CSV row per period, including periods without records.
///
/// # Errors
///
/// Returns [`ExportError::Csv`] if writing fails.
pub fn write_summary_csv<W: Write>(report: &OverlapReport, writer: W) -> Result<(), ExportError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(SUMMARY_COLUMNS)?;

    for summary in &report.summaries {
        csv.write_record([
            summary.periodo.clone(),
            summary.start.to_string(),
            summary.end.to_string(),
            summary.row_count.to_string(),
            summary.percentual.to_string(),
            summary.area_periodo.to_string(),
            report.area_total_fazenda.to_string(),
        ])?;
    }

    csv.flush().map_err(csv::Error::from)?;
    Ok(())
}
