//! Map view description for an interactive viewer.
//!
//! Two overlay layers (result polygons filled red, farm boundary outlined
//! green) centered on the mean centroid of the result geometries. The view
//! is expressed in the input CRS; reprojecting to geographic coordinates
//! is left to the viewer.

use deforest_overlap_models::{Layer, OverlapReport, PolygonalGeometry};
use geo::Centroid as _;
use geojson::FeatureCollection;
use serde::Serialize;

use crate::ExportError;
use crate::features::{layer_feature_collection, to_feature_collection};

/// Initial zoom level of the view.
pub const DEFAULT_ZOOM: u8 = 12;

/// Center of the initial view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapCenter {
    /// X coordinate (longitude for geographic CRSs).
    pub longitude: f64,
    /// Y coordinate (latitude for geographic CRSs).
    pub latitude: f64,
}

/// One styled overlay layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapLayer {
    /// Layer identifier.
    pub id: String,
    /// Features to draw.
    pub data: FeatureCollection,
    /// Whether features respond to hover/click.
    pub pickable: bool,
    /// Whether outlines are drawn.
    pub stroked: bool,
    /// Whether polygons are filled.
    pub filled: bool,
    /// RGBA fill color, if filled.
    pub fill_color: Option<[u8; 4]>,
    /// RGBA outline color.
    pub line_color: [u8; 4],
    /// Minimum outline width in pixels.
    pub line_width_min_pixels: u8,
}

/// A complete map view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    /// Initial center, `None` when there is nothing to show.
    pub center: Option<MapCenter>,
    /// Initial zoom level.
    pub zoom: u8,
    /// Camera pitch in degrees.
    pub pitch: u8,
    /// Result layer first, farm layer second.
    pub layers: Vec<MapLayer>,
}

impl MapView {
    /// Builds the view for a report and the farm layer it was computed
    /// against. When the report has no rows the center falls back to the
    /// farm polygons.
    #[must_use]
    pub fn build(report: &OverlapReport, farm: &Layer) -> Self {
        let center = mean_centroid(report.records.iter().map(|r| r.geometry.clone())).or_else(
            || {
                mean_centroid(
                    farm.features
                        .iter()
                        .filter_map(|f| PolygonalGeometry::from_geometry(&f.geometry)),
                )
            },
        );

        let result_layer = MapLayer {
            id: "resultado".to_string(),
            data: to_feature_collection(report),
            pickable: true,
            stroked: true,
            filled: true,
            fill_color: Some([255, 0, 0, 80]),
            line_color: [255, 0, 0, 255],
            line_width_min_pixels: 1,
        };

        let farm_layer = MapLayer {
            id: "fazenda".to_string(),
            data: layer_feature_collection(farm),
            pickable: true,
            stroked: true,
            filled: false,
            fill_color: None,
            line_color: [0, 155, 0, 255],
            line_width_min_pixels: 2,
        };

        Self {
            center,
            zoom: DEFAULT_ZOOM,
            pitch: 0,
            layers: vec![result_layer, farm_layer],
        }
    }

    /// Serializes the view as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Mean of the centroids of `geometries`, or `None` if none has one.
#[allow(clippy::cast_precision_loss)]
fn mean_centroid(geometries: impl Iterator<Item = PolygonalGeometry>) -> Option<MapCenter> {
    let centroids: Vec<geo::Point<f64>> = geometries
        .filter_map(|geometry| match geometry {
            PolygonalGeometry::Polygon(polygon) => polygon.centroid(),
            PolygonalGeometry::MultiPolygon(multi) => multi.centroid(),
        })
        .collect();

    if centroids.is_empty() {
        return None;
    }

    let count = centroids.len() as f64;
    Some(MapCenter {
        longitude: centroids.iter().map(|p| p.x()).sum::<f64>() / count,
        latitude: centroids.iter().map(|p| p.y()).sum::<f64>() / count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::sample_report;
    use deforest_overlap_models::{Attributes, Feature};
    use geo::{Geometry, polygon};

    fn farm() -> Layer {
        Layer::new(vec![Feature::new(
            Geometry::Polygon(polygon![
                (x: 0.0, y: 0.0),
                (x: 1000.0, y: 0.0),
                (x: 1000.0, y: 500.0),
                (x: 0.0, y: 500.0)
            ]),
            Attributes::new(),
        )])
    }

    #[test]
    fn centers_on_result_centroids() {
        let view = MapView::build(&sample_report(), &farm());

        let center = view.center.unwrap();
        assert!((center.longitude - 350.0).abs() < 1e-9);
        assert!((center.latitude - 200.0).abs() < 1e-9);
        assert_eq!(view.zoom, DEFAULT_ZOOM);
    }

    #[test]
    fn falls_back_to_farm_when_empty() {
        let mut report = sample_report();
        report.records.clear();

        let view = MapView::build(&report, &farm());

        let center = view.center.unwrap();
        assert!((center.longitude - 500.0).abs() < 1e-9);
        assert!((center.latitude - 250.0).abs() < 1e-9);
    }

    #[test]
    fn no_center_without_geometries() {
        let mut report = sample_report();
        report.records.clear();

        assert!(MapView::build(&report, &Layer::default()).center.is_none());
    }

    #[test]
    fn layers_are_styled() {
        let view = MapView::build(&sample_report(), &farm());

        assert_eq!(view.layers.len(), 2);
        assert_eq!(view.layers[0].fill_color, Some([255, 0, 0, 80]));
        assert!(!view.layers[1].filled);
        assert_eq!(view.layers[1].line_color, [0, 155, 0, 255]);

        let json = view.to_json().unwrap();
        assert!(json.contains("\"line_width_min_pixels\": 2"));
    }
}
