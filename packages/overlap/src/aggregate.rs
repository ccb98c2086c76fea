//! Period area aggregation.

use crate::OverlapError;
use crate::overlay::MeasuredIntersection;

/// Sums the `area_km` of `rows` and expresses it as a percentage of
/// `total_farm_area`.
///
/// Returns `(percentage, summed_area)`.
///
/// # Errors
///
/// Returns [`OverlapError::DivisionByZero`] if `total_farm_area` is not positive
/// or not finite.
pub fn aggregate_percent(
    rows: &[MeasuredIntersection],
    total_farm_area: f64,
) -> Result<(f64, f64), OverlapError> {
    if total_farm_area <= 0.0 || !total_farm_area.is_finite() {
        return Err(OverlapError::DivisionByZero { total_farm_area });
    }

    let summed: f64 = rows.iter().map(|row| row.area_km).sum();
    let percentage = summed / total_farm_area * 100.0;

    Ok((percentage, summed))
}
