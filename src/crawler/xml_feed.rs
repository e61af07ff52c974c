use anyhow::Context;
use geojson::{feature::Id, JsonObject, JsonValue};

use super::{
    xml_tree::{self, XmlElement},
    CrawlError, DataCrawler,
};

const GDACS_NAMESPACE: &str = "http://www.gdacs.org";
const DUBLIN_CORE_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
const GEORSS_NAMESPACE: &str = "http://www.georss.org/georss";

const TITLE_PROPERTY: &str = "Title";
const GEORSS_POINT_PROPERTY: &str = "GeoRSS Point";

/// Where a property is read from, relative to an `<item>`.
enum Lookup {
    /// Text of a direct child without namespace.
    Child(&'static str),
    /// Text of the first descendant in the given namespace.
    Descendant(&'static str, &'static str),
    /// Like `Descendant`, but a missing element yields null instead of an error.
    OptionalDescendant(&'static str, &'static str),
    /// Attribute of a direct child without namespace.
    ChildAttribute(&'static str, &'static str),
}

use Lookup::{Child, ChildAttribute, Descendant, OptionalDescendant};

const HEADER_FIELDS: &[(&str, Lookup)] = &[
    (TITLE_PROPERTY, Child("title")),
    ("Description", Child("description")),
    ("Link", Child("link")),
    ("Publication Date", Child("pubDate")),
];

/// `gdacs:` elements whose unit and value attributes and text are copied only when the element
/// is present.
const MEASURED_ELEMENTS: &[(&str, &str)] = &[("Severity", "severity"), ("Population", "population")];

const EVENT_FIELDS: &[(&str, Lookup)] = &[
    ("Date Added", Descendant(GDACS_NAMESPACE, "dateadded")),
    ("Date Modified", Descendant(GDACS_NAMESPACE, "datemodified")),
    ("Is Current", Descendant(GDACS_NAMESPACE, "iscurrent")),
    ("From Date", Descendant(GDACS_NAMESPACE, "fromdate")),
    ("To Date", Descendant(GDACS_NAMESPACE, "todate")),
    ("Duration in Week", Descendant(GDACS_NAMESPACE, "durationinweek")),
    ("Year", Descendant(GDACS_NAMESPACE, "year")),
    ("Subject", Descendant(DUBLIN_CORE_NAMESPACE, "subject")),
    ("Is PermaLink", ChildAttribute("guid", "isPermaLink")),
    ("Bbox", Descendant(GDACS_NAMESPACE, "bbox")),
    (GEORSS_POINT_PROPERTY, OptionalDescendant(GEORSS_NAMESPACE, "point")),
    ("Event Type", Descendant(GDACS_NAMESPACE, "eventtype")),
    ("Alert Level", Descendant(GDACS_NAMESPACE, "alertlevel")),
    ("Alert Score", Descendant(GDACS_NAMESPACE, "alertscore")),
    ("Episode Alert Level", Descendant(GDACS_NAMESPACE, "episodealertlevel")),
    ("Episode Alert Score", Descendant(GDACS_NAMESPACE, "episodealertscore")),
    ("Event ID", Descendant(GDACS_NAMESPACE, "eventid")),
    ("Episode ID", Descendant(GDACS_NAMESPACE, "episodeid")),
    ("Calculation Type", Descendant(GDACS_NAMESPACE, "calculationtype")),
    ("Severity", Descendant(GDACS_NAMESPACE, "severity")),
    ("Population", Descendant(GDACS_NAMESPACE, "population")),
    ("Vulnerability", Descendant(GDACS_NAMESPACE, "vulnerability")),
    ("Country", Descendant(GDACS_NAMESPACE, "country")),
];

/// Fetches the GDACS RSS feed and turns every geolocated `<item>` into a point feature.
pub struct XmlFeedCrawler {
    url: String,
    client: reqwest::blocking::Client,
}

impl XmlFeedCrawler {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("gdacs-ingest")
            .timeout(None)
            .build()?;
        Ok(Self {
            url: url.to_owned(),
            client,
        })
    }

    fn fetch_xml_data(&self) -> anyhow::Result<Vec<u8>> {
        let response = self.client.get(&self.url).send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

impl DataCrawler for XmlFeedCrawler {
    fn get_data(&mut self) -> anyhow::Result<Option<geojson::FeatureCollection>> {
        log::debug!("Fetching XML feed {}", self.url);
        let xml = self
            .fetch_xml_data()
            .with_context(|| format!("Fetching XML feed {}", self.url))?;
        parse_feature_collection(&xml).map(Some)
    }
}

/// Build a feature collection from an RSS document.
///
/// Items without a usable GeoRSS point are skipped with a warning and do not consume an id; ids of
/// emitted features count up from 1 in document order. An item missing any other looked-up
/// element fails the whole document.
pub fn parse_feature_collection(xml: &[u8]) -> anyhow::Result<geojson::FeatureCollection> {
    let root = xml_tree::parse(xml)?;
    let mut features = Vec::new();
    let mut next_feature_id: u64 = 1;

    for (item_index, item) in root.descendants(None, "item").into_iter().enumerate() {
        let properties = extract_event_information(item, item_index)?;
        match georss_point(&properties) {
            Some((latitude, longitude)) => {
                features.push(geojson::Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
                        longitude, latitude,
                    ]))),
                    id: Some(Id::Number(next_feature_id.into())),
                    properties: Some(properties),
                    foreign_members: None,
                });
                next_feature_id += 1;
            }
            None => log::warn!(
                "GeoRSS Point not found for the following item: {}",
                properties
                    .get(TITLE_PROPERTY)
                    .and_then(JsonValue::as_str)
                    .unwrap_or("<untitled>")
            ),
        }
    }

    log::info!("Parsed {} features from the XML feed", features.len());
    Ok(geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn extract_event_information(item: &XmlElement, item_index: usize) -> anyhow::Result<JsonObject> {
    let mut properties = JsonObject::new();

    for (property, lookup) in HEADER_FIELDS {
        properties.insert(property.to_string(), lookup_value(item, item_index, lookup)?);
    }

    for (property, element_name) in MEASURED_ELEMENTS {
        if let Some(element) = item.descendant(Some(GDACS_NAMESPACE), element_name) {
            for attribute in ["unit", "value"] {
                let value = required_attribute(element, item_index, attribute)?;
                properties.insert(format!("{} {}", property, attribute), value.into());
            }
            properties.insert(format!("{} text", property), text_value(element));
        }
    }

    for (property, lookup) in EVENT_FIELDS {
        properties.insert(property.to_string(), lookup_value(item, item_index, lookup)?);
    }

    Ok(properties)
}

fn lookup_value(item: &XmlElement, item_index: usize, lookup: &Lookup) -> anyhow::Result<JsonValue> {
    let missing_element = |element: &str| CrawlError::MissingElement {
        item: item_index,
        element: element.to_owned(),
    };
    let value = match *lookup {
        Child(name) => text_value(item.child(name).ok_or_else(|| missing_element(name))?),
        Descendant(namespace, name) => text_value(
            item.descendant(Some(namespace), name)
                .ok_or_else(|| missing_element(name))?,
        ),
        OptionalDescendant(namespace, name) => item
            .descendant(Some(namespace), name)
            .map_or(JsonValue::Null, text_value),
        ChildAttribute(name, attribute) => {
            let element = item.child(name).ok_or_else(|| missing_element(name))?;
            required_attribute(element, item_index, attribute)?.into()
        }
    };
    Ok(value)
}

fn required_attribute<'a>(
    element: &'a XmlElement,
    item_index: usize,
    attribute: &str,
) -> Result<&'a str, CrawlError> {
    element
        .attribute(attribute)
        .ok_or_else(|| CrawlError::MissingAttribute {
            item: item_index,
            element: element.name.clone(),
            attribute: attribute.to_owned(),
        })
}

fn text_value(element: &XmlElement) -> JsonValue {
    match &element.text {
        Some(text) => JsonValue::String(text.clone()),
        None => JsonValue::Null,
    }
}

/// Parse the "lat lon" pair of the GeoRSS point property.
fn georss_point(properties: &JsonObject) -> Option<(f64, f64)> {
    let point = properties.get(GEORSS_POINT_PROPERTY)?.as_str()?;
    let mut coordinates = point.split_whitespace().map(str::parse::<f64>);
    match (coordinates.next(), coordinates.next(), coordinates.next()) {
        (Some(Ok(latitude)), Some(Ok(longitude)), None) => Some((latitude, longitude)),
        _ => None,
    }
}
