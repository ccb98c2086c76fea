//! GeoJSON layer decoding.

use std::path::Path;

use deforest_overlap_models::{AttributeValue, Attributes, Feature, Layer};
use geojson::GeoJson;

use crate::LayerError;

/// Reads a GeoJSON file into a [`Layer`].
///
/// # Errors
///
/// Returns [`LayerError::Io`] if the file cannot be read and
/// [`LayerError::GeoJson`] if it is not valid GeoJSON.
pub fn read_geojson(path: &Path) -> Result<Layer, LayerError> {
    let text = std::fs::read_to_string(path).map_err(|e| LayerError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_geojson(&text).map_err(|e| LayerError::GeoJson {
        path: path.display().to_string(),
        source: e,
    })
}

/// Parses GeoJSON text (a `FeatureCollection`, a single `Feature` or a bare
/// geometry) into a [`Layer`]. Features without geometry are skipped.
///
/// # Errors
///
/// Returns a [`geojson::Error`] if the text is not valid GeoJSON or a
/// geometry cannot be converted.
pub fn parse_geojson(text: &str) -> Result<Layer, geojson::Error> {
    let geojson: GeoJson = text.parse()?;

    let (features, crs) = match geojson {
        GeoJson::FeatureCollection(collection) => {
            let crs = collection
                .foreign_members
                .as_ref()
                .and_then(|members| members.get("crs"))
                .map(crs_description);
            (collection.features, crs)
        }
        GeoJson::Feature(feature) => (vec![feature], None),
        GeoJson::Geometry(geometry) => (vec![geojson::Feature::from(geometry)], None),
    };

    let mut converted = Vec::with_capacity(features.len());
    let mut skipped = 0usize;

    for feature in features {
        let Some(geometry) = feature.geometry else {
            skipped += 1;
            continue;
        };
        let geometry = geo::Geometry::<f64>::try_from(geometry)?;
        let attributes: Attributes = feature
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| (name, json_value(value)))
            .collect();
        converted.push(Feature::new(geometry, attributes));
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} GeoJSON features without geometry");
    }

    let layer = Layer::new(converted);
    Ok(match crs {
        Some(crs) => layer.with_crs(crs),
        None => layer,
    })
}

/// Converts a JSON property to an attribute value. Strings stay text,
/// nested arrays and objects are kept as their JSON text.
fn json_value(value: serde_json::Value) -> AttributeValue {
    match value {
        serde_json::Value::Null => AttributeValue::Null,
        serde_json::Value::Bool(flag) => AttributeValue::Bool(flag),
        serde_json::Value::Number(number) => number.as_i64().map_or_else(
            || number.as_f64().map_or(AttributeValue::Null, AttributeValue::Float),
            AttributeValue::Integer,
        ),
        serde_json::Value::String(text) => AttributeValue::Text(text),
        nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
            AttributeValue::Text(nested.to_string())
        }
    }
}

/// Extracts a CRS name from a legacy GeoJSON `crs` member
/// (`{"type": "name", "properties": {"name": "..."}}`).
fn crs_description(member: &serde_json::Value) -> String {
    member
        .get("properties")
        .and_then(|props| props.get("name"))
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| member.to_string(), ToString::to_string)
}
