use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::anyhow;

use super::{
    browser::{Browser, Locator, SessionGuard},
    CrawlError, DataCrawler,
};
use crate::{geofile, schedule::Sleeper};

/// The "download results" link of the GDACS alert search page.
pub const DOWNLOAD_BUTTON_XPATH: &str = "//a[@href='javascript:onclick=downloadResult();']";
/// Element scrolled near the top of the viewport so that the download link is on screen.
const CONTENT_SEARCH_ID: &str = "contentSearch";
const VERTICAL_SCROLL_SHIFT: f64 = -50.0;
const GEOJSON_EXTENSION: &str = "geojson";

/// Fixed pauses of the export flow. These are blind waits, not readiness checks, apart from
/// `clickable_timeout` which bounds the one polling wait.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTiming {
    pub page_load: Duration,
    pub scroll_settle: Duration,
    pub clickable_timeout: Duration,
    pub download: Duration,
}

impl Default for ExportTiming {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(1),
            scroll_settle: Duration::from_secs(5),
            clickable_timeout: Duration::from_secs(10),
            download: Duration::from_secs(10),
        }
    }
}

/// Downloads the GeoJSON export of the alert search page through a browser and reads the newest
/// downloaded file. The browser session is consumed by the first crawl.
pub struct GeoJsonExportCrawler<B: Browser, S: Sleeper> {
    url: String,
    browser: Option<B>,
    downloads_directory_path: PathBuf,
    download_button: Locator,
    timing: ExportTiming,
    sleeper: S,
}

impl<B: Browser, S: Sleeper> GeoJsonExportCrawler<B, S> {
    pub fn new(url: &str, browser: B, downloads_directory_path: &Path, sleeper: S) -> Self {
        Self {
            url: url.to_owned(),
            browser: Some(browser),
            downloads_directory_path: downloads_directory_path.to_owned(),
            download_button: Locator::XPath(DOWNLOAD_BUTTON_XPATH.to_owned()),
            timing: ExportTiming::default(),
            sleeper,
        }
    }

    pub fn with_timing(mut self, timing: ExportTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Trigger the export. Returns whether the download link could be clicked. The browser
    /// session is closed before returning, on every path.
    fn download_geojson(&mut self, browser: B) -> anyhow::Result<bool> {
        let mut browser = SessionGuard::new(browser);

        browser.navigate(&self.url)?;
        browser.maximize_window()?;
        self.sleeper.sleep(self.timing.page_load);

        scroll_page_to_download_button(&mut *browser)?;
        self.sleeper.sleep(self.timing.scroll_settle);

        let button =
            match browser.wait_for_clickable(&self.download_button, self.timing.clickable_timeout)? {
                Some(button) => button,
                None => {
                    log::warn!(
                        "Download button {:?} was not clickable within {:?}",
                        self.download_button,
                        self.timing.clickable_timeout
                    );
                    return Ok(false);
                }
            };
        browser.click(&button)?;
        self.sleeper.sleep(self.timing.download);
        Ok(true)
    }
}

impl<B: Browser, S: Sleeper> DataCrawler for GeoJsonExportCrawler<B, S> {
    fn get_data(&mut self) -> anyhow::Result<Option<geojson::FeatureCollection>> {
        let browser = self
            .browser
            .take()
            .ok_or_else(|| anyhow!("The browser session of this crawler was already used"))?;
        if !self.download_geojson(browser)? {
            return Ok(None);
        }
        let latest_file =
            latest_file_with_extension(&self.downloads_directory_path, GEOJSON_EXTENSION)?;
        log::info!("Reading downloaded GeoJSON file {:?}", latest_file);
        geofile::geojson::read_feature_collection(&latest_file).map(Some)
    }
}

fn scroll_page_to_download_button<B: Browser>(browser: &mut B) -> anyhow::Result<()> {
    let content_search = browser.find_element(&Locator::Id(CONTENT_SEARCH_ID.to_owned()))?;
    let position = browser.element_position(&content_search)?;
    let scroll_position = position.y + VERTICAL_SCROLL_SHIFT;
    browser.execute_script(&format!("window.scrollTo(0, {});", scroll_position))
}

/// The most recently created file in `directory` with the given extension. Falls back to the
/// modification time on filesystems that do not record creation time.
fn latest_file_with_extension(directory: &Path, extension: &str) -> anyhow::Result<PathBuf> {
    let no_files_found = || CrawlError::NoFilesFound {
        directory: directory.to_owned(),
        extension: extension.to_owned(),
    };
    let entries = fs::read_dir(directory).map_err(|_| no_files_found())?;
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension() == Some(OsStr::new(extension)))
        .max_by_key(|path| creation_time(path))
        .ok_or_else(|| no_files_found().into())
}

fn creation_time(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|metadata| metadata.created().or_else(|_| metadata.modified()))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path, thread, time::Duration};

    use testdir::testdir;

    use super::{latest_file_with_extension, ExportTiming, GeoJsonExportCrawler, DOWNLOAD_BUTTON_XPATH};
    use crate::{
        crawler::{browser::testing::FakeBrowser, CrawlError, DataCrawler},
        schedule::testing::RecordingSleeper,
    };

    const EXPORT_URL: &str = "https://www.gdacs.org/Alerts/default.aspx";

    fn write_export(dir: &Path, name: &str, event_type: &str) {
        fs::write(
            dir.join(name),
            format!(
                r#"{{"type": "FeatureCollection", "features": [{{"type": "Feature",
                "geometry": {{"type": "Point", "coordinates": [10.0, 20.0]}},
                "properties": {{"eventtype": "{}"}}}}]}}"#,
                event_type
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_export_flow_reads_latest_download() {
        let dir = testdir!();
        write_export(&dir, "old.geojson", "FL");
        thread::sleep(Duration::from_millis(1100));
        write_export(&dir, "new.geojson", "EQ");
        fs::write(dir.join("notes.txt"), "not an export").unwrap();

        let browser = FakeBrowser::new();
        let calls = browser.calls.clone();
        let mut sleeper = RecordingSleeper::default();

        let feature_collection = GeoJsonExportCrawler::new(EXPORT_URL, browser, &dir, &mut sleeper)
            .get_data()
            .unwrap()
            .unwrap();

        assert_eq!(
            feature_collection.features[0].property("eventtype"),
            Some(&serde_json::Value::from("EQ"))
        );
        assert_eq!(
            *calls.borrow(),
            vec![
                format!("navigate {}", EXPORT_URL),
                "maximize".to_string(),
                "find Id(\"contentSearch\")".to_string(),
                "position element-1".to_string(),
                "script window.scrollTo(0, 400);".to_string(),
                format!("wait XPath(\"{}\") 10s", DOWNLOAD_BUTTON_XPATH),
                "click button".to_string(),
                "quit".to_string(),
            ]
        );
        assert_eq!(
            sleeper.pauses,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(10)
            ]
        );
    }

    #[test]
    fn test_browser_is_quit_when_click_fails() {
        let dir = testdir!();
        let mut browser = FakeBrowser::new();
        browser.fail_click = true;
        let calls = browser.calls.clone();

        let result = GeoJsonExportCrawler::new(EXPORT_URL, browser, &dir, RecordingSleeper::default())
            .get_data();

        assert!(result.is_err());
        assert_eq!(calls.borrow().last().map(String::as_str), Some("quit"));
    }

    #[test]
    fn test_unclickable_button_returns_none() {
        let dir = testdir!();
        write_export(&dir, "result.geojson", "EQ");
        let mut browser = FakeBrowser::new();
        browser.clickable = false;
        let calls = browser.calls.clone();

        let result = GeoJsonExportCrawler::new(EXPORT_URL, browser, &dir, RecordingSleeper::default())
            .with_timing(ExportTiming {
                clickable_timeout: Duration::from_secs(3),
                ..ExportTiming::default()
            })
            .get_data()
            .unwrap();

        assert!(result.is_none());
        let calls = calls.borrow();
        assert!(!calls.iter().any(|call| call.starts_with("click")));
        assert!(calls.iter().any(|call| call.ends_with(" 3s")));
        assert_eq!(calls.last().map(String::as_str), Some("quit"));
    }

    #[test]
    fn test_no_download_is_an_error() {
        let dir = testdir!();
        let err = GeoJsonExportCrawler::new(
            EXPORT_URL,
            FakeBrowser::new(),
            &dir.join("missing"),
            RecordingSleeper::default(),
        )
        .get_data()
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrawlError>(),
            Some(CrawlError::NoFilesFound { .. })
        ));
    }

    #[test]
    fn test_crawler_session_is_single_use() {
        let dir = testdir!();
        write_export(&dir, "result.geojson", "EQ");
        let mut crawler =
            GeoJsonExportCrawler::new(EXPORT_URL, FakeBrowser::new(), &dir, RecordingSleeper::default());
        assert!(crawler.get_data().unwrap().is_some());
        assert!(crawler.get_data().is_err());
    }

    #[test]
    fn test_latest_file_ignores_other_extensions() {
        let dir = testdir!();
        fs::write(dir.join("a.json"), "{}").unwrap();
        assert!(latest_file_with_extension(&dir, "geojson").is_err());
        write_export(&dir, "b.geojson", "EQ");
        assert_eq!(
            latest_file_with_extension(&dir, "geojson").unwrap(),
            dir.join("b.geojson")
        );
    }
}
