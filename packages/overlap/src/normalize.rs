//! Output-boundary normalization of attribute values.

use deforest_overlap_models::{AttributeValue, Attributes};

/// Rewrites every value of `attributes` through
/// [`AttributeValue::normalized`], turning dates and date-times into
/// ISO-8601 text.
pub fn normalize_attributes(attributes: &mut Attributes) {
    for value in attributes.values_mut() {
        let original = std::mem::replace(value, AttributeValue::Null);
        *value = original.normalized();
    }
}
