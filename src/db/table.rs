use crate::geofile::feature::Feature;

/// Tabular form of a feature collection: one row per feature, one column per property name plus
/// the geometry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoTable {
    /// Property names, each listed once. Features are visited in order, but the keys of one
    /// feature come out sorted, as `geojson::JsonObject` does not keep document order.
    pub columns: Vec<String>,
    pub rows: Vec<Feature>,
    /// CRS label the geometries are declared in. Only a label, coordinates are never transformed.
    pub crs: Option<String>,
}

impl GeoTable {
    pub fn from_features(feature_collection: &geojson::FeatureCollection) -> anyhow::Result<Self> {
        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::with_capacity(feature_collection.features.len());
        for feature in &feature_collection.features {
            if feature.geometry.is_none() {
                log::warn!("Skipping feature {:?} without geometry", feature.id);
                continue;
            }
            if let Some(properties) = &feature.properties {
                for key in properties.keys() {
                    if !columns.contains(key) {
                        columns.push(key.to_owned());
                    }
                }
            }
            rows.push(Feature::try_from(feature)?);
        }
        Ok(Self {
            columns,
            rows,
            crs: None,
        })
    }

    pub fn with_crs(mut self, crs: Option<&str>) -> Self {
        self.crs = crs.map(str::to_owned);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
