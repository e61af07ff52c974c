pub mod browser;
pub mod geojson_export;
pub mod webdriver;
pub mod xml_feed;
pub mod xml_tree;

use std::path::PathBuf;

use thiserror::Error;

/// A source of one feature collection per call.
pub trait DataCrawler {
    /// Fetch the current state of the source. `Ok(None)` means the source reported that it had
    /// nothing to deliver this time.
    fn get_data(&mut self) -> anyhow::Result<Option<geojson::FeatureCollection>>;
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("No files found matching *.{extension} in {directory:?}")]
    NoFilesFound { directory: PathBuf, extension: String },
    #[error("Feed item {item} has no <{element}> element")]
    MissingElement { item: usize, element: String },
    #[error("Feed item {item}: <{element}> has no '{attribute}' attribute")]
    MissingAttribute {
        item: usize,
        element: String,
        attribute: String,
    },
    #[error("Unsupported browser: {0}")]
    UnsupportedBrowser(String),
    #[error("WebDriver error '{error}': {message}")]
    WebDriver { error: String, message: String },
}
