use std::path::{Path, PathBuf};

use crate::{
    config::{
        settings::{required_setting, CommonSettings, DbConnection},
        yaml_config::{self, ConfigData},
    },
    crawler::{
        geojson_export::GeoJsonExportCrawler,
        webdriver::{BrowserKind, WebDriverSession},
        xml_feed::XmlFeedCrawler,
        DataCrawler,
    },
    db::{postgis::PostgisSink, GeoJsonDbDataWriter, TableSink},
    schedule::ThreadSleeper,
};

/// Builds the crawlers and the database sink for one iteration.
pub trait IngestBackend {
    fn alert_crawler(&self, common: &CommonSettings) -> anyhow::Result<Box<dyn DataCrawler>>;
    fn event_crawler(&self, common: &CommonSettings) -> anyhow::Result<Box<dyn DataCrawler>>;
    fn table_sink(&self, db_connection: &DbConnection) -> Box<dyn TableSink>;
}

/// WebDriver browser for the GeoJSON export, HTTP for the RSS feed, PostGIS for storage.
pub struct LiveBackend;

impl IngestBackend for LiveBackend {
    fn alert_crawler(&self, common: &CommonSettings) -> anyhow::Result<Box<dyn DataCrawler>> {
        let geojson_url = required_setting(&common.geojson_url, "geojson_url")?;
        let download_directory = Path::new(required_setting(
            &common.browser_download_directory_path,
            "browser_download_directory_path",
        )?);
        let browser_kind = BrowserKind::from_name(required_setting(&common.webdriver, "webdriver")?)?;
        let browser =
            WebDriverSession::start(common.webdriver_url(), browser_kind, download_directory)?;
        Ok(Box::new(GeoJsonExportCrawler::new(
            geojson_url,
            browser,
            download_directory,
            ThreadSleeper,
        )))
    }

    fn event_crawler(&self, common: &CommonSettings) -> anyhow::Result<Box<dyn DataCrawler>> {
        let xml_url = required_setting(&common.xml_url, "xml_url")?;
        Ok(Box::new(XmlFeedCrawler::new(xml_url)?))
    }

    fn table_sink(&self, db_connection: &DbConnection) -> Box<dyn TableSink> {
        Box::new(PostgisSink::new(db_connection.clone()))
    }
}

/// One ingest iteration: read the configuration, then crawl and store alerts, then events.
pub struct Pipeline<B: IngestBackend> {
    backend: B,
    config_folder: PathBuf,
    config_file_name: String,
    env: String,
}

impl<B: IngestBackend> Pipeline<B> {
    pub fn new(backend: B, config_folder: &Path, config_file_name: &str, env: &str) -> Self {
        Self {
            backend,
            config_folder: config_folder.to_owned(),
            config_file_name: config_file_name.to_owned(),
            env: env.to_owned(),
        }
    }

    /// Failures of a step are logged and only skip that step.
    pub fn run_iteration(&self) -> anyhow::Result<()> {
        let config = ConfigData::new(
            yaml_config::load(&self.config_folder, &self.config_file_name),
            &self.env,
        );
        let common = config.common_settings();
        let db_connection = config.db_connection();

        self.get_and_write_alerts_data(&common, &db_connection);
        self.get_and_write_disaster_event_data(&common, &db_connection);
        Ok(())
    }

    fn get_and_write_alerts_data(&self, common: &CommonSettings, db_connection: &DbConnection) {
        log::info!("{}", "*".repeat(50));
        log::info!("Getting alert feature collection...");
        let feature_collection = match crawl(self.backend.alert_crawler(common), "alert") {
            Some(feature_collection) => feature_collection,
            None => return,
        };

        log::info!("Writing alert feature collection to DB...");
        self.write_to_database(
            db_connection,
            &feature_collection,
            &common.disaster_alerts_table_name,
            "disaster_alerts_table_name",
            common.src.as_deref(),
        );
    }

    fn get_and_write_disaster_event_data(
        &self,
        common: &CommonSettings,
        db_connection: &DbConnection,
    ) {
        log::info!("{}", "*".repeat(50));
        log::info!("Getting disaster event feature collection...");
        let feature_collection = match crawl(self.backend.event_crawler(common), "disaster event") {
            Some(feature_collection) => feature_collection,
            None => return,
        };

        log::info!("Writing disaster event feature collection to DB...");
        self.write_to_database(
            db_connection,
            &feature_collection,
            &common.disaster_events_table_name,
            "disaster_events_table_name",
            common.src.as_deref(),
        );
    }

    fn write_to_database(
        &self,
        db_connection: &DbConnection,
        feature_collection: &geojson::FeatureCollection,
        table_name: &Option<String>,
        table_name_key: &str,
        crs: Option<&str>,
    ) {
        let result = required_setting(table_name, table_name_key).and_then(|table_name| {
            GeoJsonDbDataWriter::new(
                self.backend.table_sink(db_connection),
                feature_collection,
                table_name,
                crs,
            )
            .write()
        });
        if let Err(err) = result {
            log::error!("Error writing to the database: {:#}", err);
        }
    }
}

fn crawl(
    crawler: anyhow::Result<Box<dyn DataCrawler>>,
    description: &str,
) -> Option<geojson::FeatureCollection> {
    match crawler.and_then(|mut crawler| crawler.get_data()) {
        Ok(Some(feature_collection)) => Some(feature_collection),
        Ok(None) => {
            log::warn!("No {} feature collection was retrieved", description);
            None
        }
        Err(err) => {
            log::error!("Error getting {} feature collection: {:#}", description, err);
            None
        }
    }
}
