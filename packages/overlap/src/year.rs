//! Year column resolution and period filtering.
//!
//! The deforestation layer must carry a year attribute. Its name is
//! resolved once per run, case-insensitively, in this order:
//!
//! 1. an explicitly requested column name,
//! 2. the aliases listed in `periods.toml` (`year`, `ano`),
//! 3. the first column, in layer column order, whose name starts with
//!    `year`.
//!
//! Failing all of those is an [`OverlapError::MissingColumn`] listing the
//! available names.

use deforest_overlap_models::{Feature, Layer, PeriodDefinition};

use crate::OverlapError;
use crate::periods::year_aliases;

/// The resolved name of the year attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearColumn {
    name: String,
}

impl YearColumn {
    /// Resolves the year column from the available column names.
    ///
    /// # Errors
    ///
    /// Returns [`OverlapError::MissingColumn`] if no column matches.
    pub fn resolve(columns: &[String], explicit: Option<&str>) -> Result<Self, OverlapError> {
        let find = |wanted: &str| {
            columns
                .iter()
                .find(|column| column.eq_ignore_ascii_case(wanted))
                .cloned()
        };

        let resolved = match explicit {
            Some(wanted) => find(wanted),
            None => year_aliases()
                .iter()
                .find_map(|alias| find(alias.as_str()))
                .or_else(|| {
                    columns
                        .iter()
                        .find(|column| column.to_lowercase().starts_with("year"))
                        .cloned()
                }),
        };

        resolved.map(|name| Self { name }).ok_or_else(|| {
            OverlapError::MissingColumn {
                requested: explicit.unwrap_or("year").to_string(),
                available: columns.to_vec(),
            }
        })
    }

    /// Resolves the year column of a layer.
    ///
    /// # Errors
    ///
    /// Returns [`OverlapError::MissingColumn`] if no column matches.
    pub fn for_layer(layer: &Layer, explicit: Option<&str>) -> Result<Self, OverlapError> {
        Self::resolve(&layer.columns(), explicit)
    }

    /// The attribute name as it appears in the layer.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Year of a feature, if it has a usable one.
    #[must_use]
    pub fn year_of(&self, feature: &Feature) -> Option<f64> {
        feature.attributes.get(&self.name).and_then(|v| v.as_year())
    }

    /// Features whose year lies within `period`.
    #[must_use]
    pub fn select<'a>(&self, layer: &'a Layer, period: &PeriodDefinition) -> Vec<&'a Feature> {
        layer
            .features
            .iter()
            .filter(|feature| self.year_of(feature).is_some_and(|y| period.contains(y)))
            .collect()
    }
}

/// Returns the features of `layer` whose year attribute lies within
/// `[year_start, year_end]` inclusive.
///
/// # Errors
///
/// Returns [`OverlapError::MissingColumn`] if the layer has no year column.
pub fn filter_by_period(
    layer: &Layer,
    year_start: i32,
    year_end: i32,
) -> Result<Vec<&Feature>, OverlapError> {
    let column = YearColumn::for_layer(layer, None)?;
    let period = PeriodDefinition {
        label: format!("{year_start}_{year_end}"),
        start: year_start,
        end: year_end,
    };
    Ok(column.select(layer, &period))
}
