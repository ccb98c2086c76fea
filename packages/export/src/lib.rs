#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Outputs for overlap reports.
//!
//! Writes the combined table as CSV (geometry dropped) and as a GeoJSON
//! feature collection, packages it as a zipped ESRI shapefile, and
//! prepares a map view description with the result and farm layers.

pub mod features;
pub mod map;
pub mod package;
pub mod table;

pub use features::{layer_feature_collection, to_feature_collection};
pub use map::MapView;
pub use package::write_package;
pub use table::{write_csv, write_summary_csv};

/// Errors that can occur while writing outputs.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Shapefile geometry could not be encoded.
    #[error("Shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    /// Shapefile attribute table could not be encoded.
    #[error("DBF error: {0}")]
    Dbase(#[from] dbase::Error),

    /// A column name cannot be stored in a `.dbf` header.
    #[error("Invalid DBF field name '{name}': {reason}")]
    FieldName {
        /// Offending name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },

    /// Zip archive could not be written.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// I/O error on an output file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
