use std::{fs, io, path::Path};

use serde_yaml::{Mapping, Value};

use super::settings::{CommonSettings, DbConnection};

const COMMON_KEY: &str = "COMMON";
const DB_CONNECTION_KEY: &str = "DB_CONNECTION";

/// Read the YAML configuration document `folder/filename`.
///
/// Never fails: a missing file, an unreadable file, invalid YAML or a document whose top level is not
/// a mapping are logged and yield an empty mapping. Callers treat every lookup on it as absent.
pub fn load(folder: &Path, filename: &str) -> Mapping {
    let config_path = folder.join(filename);
    let contents = match fs::read_to_string(&config_path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log::error!("Config file not found at {:?}", config_path);
            return Mapping::new();
        }
        Err(err) => {
            log::error!("Could not read config file {:?}: {}", config_path, err);
            return Mapping::new();
        }
    };
    match serde_yaml::from_str::<Value>(&contents) {
        Ok(Value::Mapping(mapping)) => mapping,
        Ok(other) => {
            log::error!(
                "Config file {:?} does not contain a mapping at the top level: {:?}",
                config_path,
                other
            );
            Mapping::new()
        }
        Err(err) => {
            log::error!("Error parsing YAML in config file {:?}: {}", config_path, err);
            Mapping::new()
        }
    }
}

/// Raw configuration plus the runtime environment label that selects the DB connection.
#[derive(Debug, Clone)]
pub struct ConfigData {
    config_data: Mapping,
    env: String,
}

impl ConfigData {
    pub fn new(config_data: Mapping, env: &str) -> Self {
        Self {
            config_data,
            env: env.to_owned(),
        }
    }

    /// The `COMMON` section, or an empty mapping if absent.
    pub fn common(&self) -> Mapping {
        sub_mapping(&self.config_data, COMMON_KEY)
    }

    /// The `DB_CONNECTION` section for the configured environment, or an empty mapping if absent.
    pub fn db_config(&self) -> Mapping {
        sub_mapping(&sub_mapping(&self.config_data, DB_CONNECTION_KEY), &self.env)
    }

    pub fn common_settings(&self) -> CommonSettings {
        typed_view(self.common(), COMMON_KEY)
    }

    pub fn db_connection(&self) -> DbConnection {
        typed_view(self.db_config(), DB_CONNECTION_KEY)
    }
}

fn sub_mapping(mapping: &Mapping, key: &str) -> Mapping {
    match mapping.get(key) {
        Some(Value::Mapping(sub)) => sub.clone(),
        _ => Mapping::new(),
    }
}

fn typed_view<T: serde::de::DeserializeOwned + Default>(mapping: Mapping, section: &str) -> T {
    serde_yaml::from_value(Value::Mapping(mapping)).unwrap_or_else(|err| {
        log::error!("Invalid {} section in config: {}", section, err);
        T::default()
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;
    use serde_yaml::{Mapping, Value};
    use testdir::testdir;

    use super::{load, ConfigData};

    const SAMPLE_CONFIG: &str = r#"{"COMMON": {"x": 1}, "DB_CONNECTION": {"localhost": {"user": "a"}}}"#;

    fn mapping_from(yaml: &str) -> Mapping {
        match serde_yaml::from_str(yaml).unwrap() {
            Value::Mapping(mapping) => mapping,
            other => panic!("not a mapping: {:?}", other),
        }
    }

    #[rstest]
    #[case("localhost", r#"{"user": "a"}"#)]
    #[case("prod", "{}")]
    fn test_config_views(#[case] env: &str, #[case] expected_db_config: &str) {
        let config = ConfigData::new(mapping_from(SAMPLE_CONFIG), env);
        assert_eq!(config.common(), mapping_from(r#"{"x": 1}"#));
        assert_eq!(config.db_config(), mapping_from(expected_db_config));
    }

    #[test]
    fn test_empty_config_views_are_empty() {
        let config = ConfigData::new(Mapping::new(), "localhost");
        assert!(config.common().is_empty());
        assert!(config.db_config().is_empty());
        assert_eq!(config.common_settings().xml_url, None);
        assert_eq!(config.db_connection().port, 5432);
    }

    #[test]
    fn test_load_missing_file_returns_empty_mapping() {
        let dir = testdir!();
        assert!(load(&dir, "does_not_exist.yaml").is_empty());
    }

    #[rstest]
    #[case("COMMON: [unclosed")]
    #[case("")]
    #[case("- just\n- a list\n")]
    fn test_load_unusable_document_returns_empty_mapping(#[case] contents: &str) {
        let dir = testdir!();
        fs::write(dir.join("config.yaml"), contents).unwrap();
        assert!(load(&dir, "config.yaml").is_empty());
    }

    #[test]
    fn test_load_typed_settings() {
        let dir = testdir!();
        fs::write(
            dir.join("config.yaml"),
            r#"
COMMON:
  webdriver: Google Chrome
  geojson_url: https://www.gdacs.org/Alerts/default.aspx
  xml_url: https://www.gdacs.org/xml/rss.xml
  browser_download_directory_path: /tmp/downloads
  disaster_alerts_table_name: disaster_alerts
  disaster_events_table_name: disaster_events
  src: EPSG:4326
DB_CONNECTION:
  localhost:
    user: postgres
    password: secret
    host: localhost
    port: 5433
    database: gdacs
"#,
        )
        .unwrap();

        let config = ConfigData::new(load(&dir, "config.yaml"), "localhost");
        let common = config.common_settings();
        assert_eq!(common.webdriver.as_deref(), Some("Google Chrome"));
        assert_eq!(common.xml_url.as_deref(), Some("https://www.gdacs.org/xml/rss.xml"));
        assert_eq!(common.src.as_deref(), Some("EPSG:4326"));
        assert_eq!(common.webdriver_url, None);

        let db = config.db_connection();
        assert_eq!(db.user, "postgres");
        assert_eq!(db.port, 5433);
        assert_eq!(db.database, "gdacs");
    }

    #[test]
    fn test_numeric_scalars_keep_their_sections() {
        let config = ConfigData::new(
            mapping_from(
                r#"{"COMMON": {"xml_url": "https://www.gdacs.org/xml/rss.xml", "src": 4326},
                    "DB_CONNECTION": {"localhost": {"port": "5432", "host": "h"}}}"#,
            ),
            "localhost",
        );
        let common = config.common_settings();
        assert_eq!(common.xml_url.as_deref(), Some("https://www.gdacs.org/xml/rss.xml"));
        assert_eq!(common.src.as_deref(), Some("4326"));
        let db = config.db_connection();
        assert_eq!(db.host, "h");
        assert_eq!(db.port, 5432);
    }

    #[test]
    fn test_ill_typed_section_falls_back_to_defaults() {
        let config = ConfigData::new(
            mapping_from(r#"{"DB_CONNECTION": {"localhost": {"port": "not a port"}}}"#),
            "localhost",
        );
        assert_eq!(config.db_connection().host, "");
    }
}
