//! Compile-time registry of the historical periods.
//!
//! The period table and the accepted year column aliases are embedded from
//! `periods.toml` via `include_str!`, so the set is fixed at build time.
//! It is parsed once, on first use.

use std::sync::LazyLock;

use deforest_overlap_models::PeriodDefinition;
use serde::Deserialize;

/// Number of registered periods. Enforced by a test.
#[cfg(test)]
const EXPECTED_PERIOD_COUNT: usize = 4;

/// Embedded period registry.
const PERIODS_TOML: &str = include_str!("../periods.toml");

#[derive(Debug, Deserialize)]
struct PeriodRegistry {
    year_aliases: Vec<String>,
    periods: Vec<PeriodDefinition>,
}

static REGISTRY: LazyLock<PeriodRegistry> = LazyLock::new(|| {
    toml::de::from_str(PERIODS_TOML)
        .unwrap_or_else(|e| panic!("Failed to parse embedded periods.toml: {e}"))
});

/// Returns all periods in processing order.
///
/// # Panics
///
/// Panics if the embedded TOML fails to parse. Since it is a compile-time
/// constant, a parse failure is a development error caught by the tests.
#[must_use]
pub fn all_periods() -> Vec<PeriodDefinition> {
    REGISTRY.periods.clone()
}

/// Returns the accepted year column names, in priority order.
///
/// # Panics
///
/// Panics if the embedded TOML fails to parse.
#[must_use]
pub fn year_aliases() -> Vec<String> {
    REGISTRY.year_aliases.clone()
}

/// Looks up a period by its label.
#[must_use]
pub fn find_period(label: &str) -> Option<PeriodDefinition> {
    REGISTRY.periods.iter().find(|p| p.label == label).cloned()
}
