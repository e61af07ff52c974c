use std::{fs, path::Path};

use anyhow::Context;

pub fn parse_feature_collection(contents: &str) -> anyhow::Result<geojson::FeatureCollection> {
    let geojson_contents: geojson::GeoJson = contents.parse()?;
    Ok(geojson::FeatureCollection::try_from(geojson_contents)?)
}

pub fn read_feature_collection(input_filepath: &Path) -> anyhow::Result<geojson::FeatureCollection> {
    let contents = fs::read_to_string(input_filepath)
        .with_context(|| format!("Reading GeoJSON file {:?}", input_filepath))?;
    parse_feature_collection(&contents)
        .with_context(|| format!("Parsing GeoJSON file {:?}", input_filepath))
}
