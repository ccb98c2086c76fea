//! Polygon intersection overlay between two feature sets.
//!
//! Both sides are restricted to polygonal geometries. Candidate pairs are
//! found through an R-tree over the right-hand side's bounding boxes, then
//! clipped with [`BooleanOps::intersection`]. Each non-empty intersection
//! becomes one [`MeasuredIntersection`] carrying the merged attributes of
//! both features.

use deforest_overlap_models::{Attributes, Feature, PolygonalGeometry};
use geo::{BooleanOps as _, BoundingRect as _, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};

use crate::AREA_SCALE;

/// One clipped polygon with its scaled area, before period stamping.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredIntersection {
    /// Shared region of the two source features.
    pub geometry: PolygonalGeometry,
    /// Attributes of both sources (`_1`/`_2` suffixes on name clashes).
    pub attributes: Attributes,
    /// Geometry area divided by [`AREA_SCALE`].
    pub area_km: f64,
}

/// A polygonal feature prepared for the overlay.
struct OverlayEntry<'a> {
    index: usize,
    feature: &'a Feature,
    polygon: MultiPolygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for OverlayEntry<'_> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Keeps the polygonal features, in input order. Points, lines,
/// collections and empty polygons are dropped.
#[must_use]
pub fn polygonal_features<'a>(
    features: impl IntoIterator<Item = &'a Feature>,
) -> Vec<(&'a Feature, PolygonalGeometry)> {
    features
        .into_iter()
        .filter_map(|feature| {
            PolygonalGeometry::from_geometry(&feature.geometry).map(|g| (feature, g))
        })
        .collect()
}

fn prepare<'a>(features: impl IntoIterator<Item = &'a Feature>) -> Vec<OverlayEntry<'a>> {
    polygonal_features(features)
        .into_iter()
        .enumerate()
        .map(|(index, (feature, geometry))| {
            let polygon = geometry.to_multi_polygon();
            let envelope = compute_envelope(&polygon);
            OverlayEntry {
                index,
                feature,
                polygon,
                envelope,
            }
        })
        .collect()
}

/// Intersects every overlapping pair of polygonal features from `left`
/// and `right` and measures each intersection.
///
/// Rows come out ordered by `left` feature, then by `right` feature.
/// Pairs that do not overlap, or only touch along an edge or at a point,
/// produce no row.
#[must_use]
pub fn intersect_and_measure<'a, 'b>(
    left: impl IntoIterator<Item = &'a Feature>,
    right: impl IntoIterator<Item = &'b Feature>,
) -> Vec<MeasuredIntersection> {
    let left = prepare(left);
    let right = RTree::bulk_load(prepare(right));

    let mut rows = Vec::new();

    for a in &left {
        let mut candidates: Vec<&OverlayEntry<'_>> = right
            .locate_in_envelope_intersecting(&a.envelope)
            .collect();
        candidates.sort_by_key(|entry| entry.index);

        for b in candidates {
            let clipped = a.polygon.intersection(&b.polygon);
            let Some(geometry) = PolygonalGeometry::from_parts(clipped) else {
                continue;
            };

            let area = geometry.unsigned_area();
            if area <= 0.0 {
                continue;
            }

            rows.push(MeasuredIntersection {
                geometry,
                attributes: merge_attributes(&a.feature.attributes, &b.feature.attributes),
                area_km: area / AREA_SCALE,
            });
        }
    }

    log::debug!(
        "Overlay of {} x {} polygonal features produced {} intersections",
        left.len(),
        right.size(),
        rows.len()
    );

    rows
}

/// Merges two attribute sets. A name present on both sides is kept twice,
/// as `{name}_1` (left) and `{name}_2` (right).
#[must_use]
pub fn merge_attributes(left: &Attributes, right: &Attributes) -> Attributes {
    let mut merged = Attributes::new();

    for (name, value) in left {
        let key = if right.contains_key(name) {
            format!("{name}_1")
        } else {
            name.clone()
        };
        merged.insert(key, value.clone());
    }
    for (name, value) in right {
        let key = if left.contains_key(name) {
            format!("{name}_2")
        } else {
            name.clone()
        };
        merged.insert(key, value.clone());
    }

    merged
}

/// Sum of the polygonal geometry areas of `features`, scaled by
/// [`AREA_SCALE`].
#[must_use]
pub fn total_area<'a>(features: impl IntoIterator<Item = &'a Feature>) -> f64 {
    polygonal_features(features)
        .iter()
        .map(|(_, geometry)| geometry.unsigned_area())
        .sum::<f64>()
        / AREA_SCALE
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
