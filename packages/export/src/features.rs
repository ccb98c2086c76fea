//! GeoJSON output of reports and layers.

use deforest_overlap_models::{
    AttributeValue, Attributes, IntersectionRecord, Layer, OverlapReport, PolygonalGeometry,
};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};

/// Converts an attribute value to JSON. Temporal values are written as
/// ISO-8601 text.
#[must_use]
pub fn attribute_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Null => JsonValue::Null,
        AttributeValue::Bool(flag) => JsonValue::Bool(*flag),
        AttributeValue::Integer(number) => JsonValue::from(*number),
        AttributeValue::Float(number) => serde_json::Number::from_f64(*number)
            .map_or(JsonValue::Null, JsonValue::Number),
        AttributeValue::Text(text) => JsonValue::String(text.clone()),
        temporal @ (AttributeValue::Date(_) | AttributeValue::DateTime(_)) => {
            JsonValue::String(temporal.clone().normalized().to_string())
        }
    }
}

fn properties(attributes: &Attributes) -> JsonObject {
    attributes
        .iter()
        .map(|(name, value)| (name.clone(), attribute_json(value)))
        .collect()
}

fn geometry(polygonal: &PolygonalGeometry) -> Geometry {
    Geometry::new(geojson::Value::from(&polygonal.to_geometry()))
}

fn feature(geometry: Geometry, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn collection(features: Vec<Feature>, crs: Option<&str>) -> FeatureCollection {
    let foreign_members = crs.map(|name| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            serde_json::json!({ "type": "name", "properties": { "name": name } }),
        );
        members
    });

    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}

/// One GeoJSON feature for an intersection record, with the attribute
/// columns and the derived columns as properties.
#[must_use]
pub fn record_feature(record: &IntersectionRecord) -> Feature {
    let mut props = properties(&record.attributes);
    props.insert("periodo".into(), JsonValue::String(record.periodo.clone()));
    props.insert(
        "area_km".into(),
        attribute_json(&AttributeValue::Float(record.area_km)),
    );
    props.insert(
        "percentual".into(),
        attribute_json(&AttributeValue::Float(record.percentual)),
    );
    props.insert(
        "area_periodo".into(),
        attribute_json(&AttributeValue::Float(record.area_periodo)),
    );
    props.insert(
        "area_total_fazenda".into(),
        attribute_json(&AttributeValue::Float(record.area_total_fazenda)),
    );

    feature(geometry(&record.geometry), props)
}

/// The whole report as a feature collection. The report CRS, if known, is
/// written as a legacy `crs` member.
#[must_use]
pub fn to_feature_collection(report: &OverlapReport) -> FeatureCollection {
    collection(
        report.records.iter().map(record_feature).collect(),
        report.crs.as_deref(),
    )
}

/// The polygonal features of an input layer as a feature collection, for
/// map overlays. Non-polygonal features are left out.
#[must_use]
pub fn layer_feature_collection(layer: &Layer) -> FeatureCollection {
    let features = layer
        .features
        .iter()
        .filter_map(|f| {
            PolygonalGeometry::from_geometry(&f.geometry)
                .map(|polygonal| feature(geometry(&polygonal), properties(&f.attributes)))
        })
        .collect();

    collection(features, layer.crs.as_deref())
}
