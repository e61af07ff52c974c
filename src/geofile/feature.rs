use std::collections::HashMap;

use anyhow::anyhow;

/// Attribute values of a feature, keyed by field name.
pub type FeatureMap = HashMap<String, String>;

/// A geometry with string attributes, the row shape written to geospatial tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: geo::Geometry,
    // TODO support different value types besides String. See gdal::vector::OGRFieldType for types
    // supported by GDAL.
    pub attributes: Option<FeatureMap>,
}

impl TryFrom<&geojson::Feature> for Feature {
    type Error = anyhow::Error;

    /// Null property values are left out of the attributes; strings are taken as-is and any
    /// other JSON value is kept as its JSON text.
    fn try_from(feature: &geojson::Feature) -> anyhow::Result<Self> {
        let geometry = feature
            .geometry
            .clone()
            .ok_or_else(|| anyhow!("Feature {:?} has no geometry", feature.id))?;
        let geometry: geo::Geometry = geometry.try_into()?;
        let attributes = feature.properties.as_ref().map(|properties| {
            properties
                .iter()
                .filter_map(|(key, value)| {
                    property_to_string(value).map(|value| (key.to_owned(), value))
                })
                .collect::<FeatureMap>()
        });
        Ok(Self {
            geometry,
            attributes,
        })
    }
}

fn property_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(value) => Some(value.to_owned()),
        other => Some(other.to_string()),
    }
}
