#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature, period and intersection record types.
//!
//! These types describe the two input layers (deforestation polygons with
//! a year attribute, farm boundary polygons) and the per-period overlap
//! table produced from them. They carry no I/O and no overlay logic.

use std::fmt;

use chrono::{Datelike as _, NaiveDate, NaiveDateTime};
use geo::{Area as _, Geometry, HasDimensions as _, MultiPolygon, Polygon};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Attribute name to value mapping of a single feature, in source column
/// order.
pub type Attributes = IndexMap<String, AttributeValue>;

/// A single attribute value read from an input layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Missing value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Whole number.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Free text.
    Text(String),
    /// Calendar date (e.g. a DBF `D` field).
    Date(NaiveDate),
    /// Date and time of day.
    DateTime(NaiveDateTime),
}

impl AttributeValue {
    /// Interprets the value as a year for period filtering.
    ///
    /// Integers, finite floats and numeric text are accepted as-is, dates
    /// contribute their calendar year. Anything else has no year and
    /// therefore never falls inside a period.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_year(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Float(value) if value.is_finite() => Some(*value),
            Self::Text(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Self::Date(date) => Some(f64::from(date.year())),
            Self::DateTime(datetime) => Some(f64::from(datetime.year())),
            Self::Null | Self::Bool(_) | Self::Float(_) => None,
        }
    }

    /// Converts temporal values to their ISO-8601 text form so the value
    /// can be written by any serializer. Other values are returned unchanged.
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::Date(date) => Self::Text(date.format("%Y-%m-%d").to_string()),
            Self::DateTime(datetime) => {
                Self::Text(datetime.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
            other => other,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Self::DateTime(value) => write!(f, "{}", value.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

/// A geometry plus its attributes, as read from an input layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Geometry of any type. Only polygonal geometries take part in the
    /// overlay; everything else is dropped there.
    pub geometry: Geometry<f64>,
    /// Attribute values keyed by column name.
    pub attributes: Attributes,
}

impl Feature {
    /// Creates a feature from a geometry and its attributes.
    #[must_use]
    pub const fn new(geometry: Geometry<f64>, attributes: Attributes) -> Self {
        Self {
            geometry,
            attributes,
        }
    }
}

/// An in-memory feature collection together with its coordinate reference
/// system description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    /// Features in file order.
    pub features: Vec<Feature>,
    /// CRS as found in the source (e.g. `.prj` WKT). Opaque: areas are
    /// computed in whatever linear unit the coordinates use.
    pub crs: Option<String>,
}

impl Layer {
    /// Creates a layer with no CRS description.
    #[must_use]
    pub const fn new(features: Vec<Feature>) -> Self {
        Self {
            features,
            crs: None,
        }
    }

    /// Attaches a CRS description.
    #[must_use]
    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    /// Union of all attribute names across features, in the order each
    /// name is first seen.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        first_seen(self.features.iter().map(|feature| &feature.attributes))
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the layer holds no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// One historical period: a label and an inclusive year range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodDefinition {
    /// Label written to the `periodo` column (e.g. `"1980_1994"`).
    pub label: String,
    /// First year of the period, inclusive.
    pub start: i32,
    /// Last year of the period, inclusive.
    pub end: i32,
}

impl PeriodDefinition {
    /// Whether `year` lies within `[start, end]`.
    #[must_use]
    pub fn contains(&self, year: f64) -> bool {
        f64::from(self.start) <= year && year <= f64::from(self.end)
    }
}

/// A geometry that is guaranteed to be a `Polygon` or a `MultiPolygon`.
#[derive(Debug, Clone, PartialEq)]
pub enum PolygonalGeometry {
    /// Single-part polygon.
    Polygon(Polygon<f64>),
    /// Multi-part polygon.
    MultiPolygon(MultiPolygon<f64>),
}

impl PolygonalGeometry {
    /// Keeps polygonal geometries, returns `None` for every other type and
    /// for empty polygons.
    #[must_use]
    pub fn from_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        let polygonal = match geometry {
            Geometry::Polygon(polygon) => Self::Polygon(polygon.clone()),
            Geometry::MultiPolygon(multi) => Self::MultiPolygon(multi.clone()),
            _ => return None,
        };
        if polygonal.is_empty() {
            None
        } else {
            Some(polygonal)
        }
    }

    /// Collapses a clipping result: a single part becomes a `Polygon`,
    /// several parts stay a `MultiPolygon`, no parts yields `None`.
    #[must_use]
    pub fn from_parts(mut multi: MultiPolygon<f64>) -> Option<Self> {
        multi.0.retain(|polygon| !polygon.is_empty());
        match multi.0.len() {
            0 => None,
            1 => multi.0.pop().map(Self::Polygon),
            _ => Some(Self::MultiPolygon(multi)),
        }
    }

    /// Geometry type name as used in GIS tooling.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Polygon(_) => "Polygon",
            Self::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Whether the geometry has no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Polygon(polygon) => polygon.is_empty(),
            Self::MultiPolygon(multi) => multi.is_empty(),
        }
    }

    /// Planar area in squared coordinate units.
    #[must_use]
    pub fn unsigned_area(&self) -> f64 {
        match self {
            Self::Polygon(polygon) => polygon.unsigned_area(),
            Self::MultiPolygon(multi) => multi.unsigned_area(),
        }
    }

    /// Returns the geometry as a `MultiPolygon`, wrapping single polygons.
    #[must_use]
    pub fn to_multi_polygon(&self) -> MultiPolygon<f64> {
        match self {
            Self::Polygon(polygon) => MultiPolygon(vec![polygon.clone()]),
            Self::MultiPolygon(multi) => multi.clone(),
        }
    }

    /// Returns a general [`Geometry`] for serialization.
    #[must_use]
    pub fn to_geometry(&self) -> Geometry<f64> {
        match self {
            Self::Polygon(polygon) => Geometry::Polygon(polygon.clone()),
            Self::MultiPolygon(multi) => Geometry::MultiPolygon(multi.clone()),
        }
    }
}

/// One row of the combined overlap table.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionRecord {
    /// Intersection of one deforestation polygon with one farm polygon.
    pub geometry: PolygonalGeometry,
    /// Attributes of both source features. Names present on both sides
    /// carry `_1` (deforestation) and `_2` (farm) suffixes.
    pub attributes: Attributes,
    /// Period label.
    pub periodo: String,
    /// Intersection area divided by 10,000.
    pub area_km: f64,
    /// Period's total intersected area as a percentage of the farm area.
    pub percentual: f64,
    /// Period's total intersected area (scaled).
    pub area_periodo: f64,
    /// Farm's total polygon area (scaled).
    pub area_total_fazenda: f64,
}

/// Per-period totals, present for every period even when it produced no rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    /// Period label.
    pub periodo: String,
    /// First year, inclusive.
    pub start: i32,
    /// Last year, inclusive.
    pub end: i32,
    /// Number of intersection rows in this period.
    pub row_count: usize,
    /// Period area as a percentage of the farm area.
    pub percentual: f64,
    /// Total intersected area of the period (scaled).
    pub area_periodo: f64,
}

/// The combined result of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapReport {
    /// All intersection rows, in fixed period order.
    pub records: Vec<IntersectionRecord>,
    /// One summary per period, in fixed period order.
    pub summaries: Vec<PeriodSummary>,
    /// Farm's total polygon area (scaled).
    pub area_total_fazenda: f64,
    /// CRS of the deforestation layer, which the result geometries share.
    pub crs: Option<String>,
}

impl OverlapReport {
    /// Union of attribute names across all records, in the order each name
    /// is first seen.
    #[must_use]
    pub fn attribute_columns(&self) -> Vec<String> {
        first_seen(self.records.iter().map(|record| &record.attributes))
    }

    /// Whether the run produced no intersection rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn first_seen<'a>(attributes: impl Iterator<Item = &'a Attributes>) -> Vec<String> {
    let names: IndexSet<&String> = attributes.flat_map(|map| map.keys()).collect();
    names.into_iter().cloned().collect()
}
