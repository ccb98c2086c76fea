#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Input layer ingestion.
//!
//! Validates the files submitted for a layer ([`Submission::classify`])
//! and decodes them into an in-memory [`Layer`]: GeoJSON through the
//! `geojson` crate, shapefiles through `shapefile` and its `dbase` tables.
//! Malformed or ambiguous submissions are rejected here, before the
//! overlap computation ever runs.

pub mod geojson_file;
pub mod shp;
pub mod submission;

use std::path::PathBuf;

use deforest_overlap_models::Layer;
use thiserror::Error;

pub use submission::{ShapefileSet, Submission};

/// Errors that can occur while loading a layer.
#[derive(Debug, Error)]
pub enum LayerError {
    /// The submitted file set is empty, ambiguous or incomplete.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A GeoJSON file could not be parsed or converted.
    #[error("GeoJSON error in {path}: {source}")]
    GeoJson {
        /// Path of the GeoJSON file.
        path: String,
        /// Underlying parse or conversion error.
        source: geojson::Error,
    },

    /// A shapefile could not be decoded.
    #[error("Shapefile error in {path}: {source}")]
    Shapefile {
        /// Path of the `.shp` file.
        path: String,
        /// Underlying decoding error.
        source: shapefile::Error,
    },
}

/// Decodes a validated submission.
///
/// # Errors
///
/// Returns an error if the files cannot be read or decoded.
pub fn load(submission: &Submission) -> Result<Layer, LayerError> {
    let layer = match submission {
        Submission::Package(path) => geojson_file::read_geojson(path)?,
        Submission::Shapefile(set) => shp::read_shapefile(set)?,
    };

    log::info!(
        "Loaded {} features from {}",
        layer.len(),
        submission.primary_path().display()
    );

    Ok(layer)
}

/// Validates `paths` as one layer submission and decodes it.
///
/// # Errors
///
/// Returns [`LayerError::InvalidInput`] for a malformed submission, or a
/// decoding error from [`load`].
pub fn load_layer(paths: &[PathBuf]) -> Result<Layer, LayerError> {
    let submission = Submission::classify(paths)?;
    load(&submission)
}
