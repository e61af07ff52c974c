use anyhow::anyhow;
use serde::{de, Deserialize, Deserializer};
use serde_yaml::Value;

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";
const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Settings under the `COMMON` key. Every field is optional so that an empty or partial
/// configuration still deserializes; the orchestrator decides which ones a step needs.
///
/// Numbers and booleans are taken as their text, so `src: 4326` reads as `"4326"`.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct CommonSettings {
    /// Browser name, e.g. "Google Chrome".
    #[serde(deserialize_with = "optional_scalar_text")]
    pub webdriver: Option<String>,
    /// WebDriver server the browser session is requested from.
    #[serde(deserialize_with = "optional_scalar_text")]
    pub webdriver_url: Option<String>,
    #[serde(deserialize_with = "optional_scalar_text")]
    pub geojson_url: Option<String>,
    #[serde(deserialize_with = "optional_scalar_text")]
    pub xml_url: Option<String>,
    #[serde(deserialize_with = "optional_scalar_text")]
    pub browser_download_directory_path: Option<String>,
    #[serde(deserialize_with = "optional_scalar_text")]
    pub disaster_alerts_table_name: Option<String>,
    #[serde(deserialize_with = "optional_scalar_text")]
    pub disaster_events_table_name: Option<String>,
    /// CRS label stamped on written tables.
    #[serde(deserialize_with = "optional_scalar_text")]
    pub src: Option<String>,
}

impl CommonSettings {
    pub fn webdriver_url(&self) -> &str {
        self.webdriver_url
            .as_deref()
            .unwrap_or(DEFAULT_WEBDRIVER_URL)
    }
}

/// The value of a `COMMON` setting a step cannot run without.
pub fn required_setting<'a>(value: &'a Option<String>, key: &str) -> anyhow::Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| anyhow!("Missing setting COMMON.{}", key))
}

/// Connection parameters for one environment under `DB_CONNECTION`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DbConnection {
    #[serde(deserialize_with = "scalar_text")]
    pub host: String,
    #[serde(deserialize_with = "port_number")]
    pub port: u16,
    #[serde(deserialize_with = "scalar_text")]
    pub user: String,
    #[serde(deserialize_with = "scalar_text")]
    pub password: String,
    #[serde(deserialize_with = "scalar_text")]
    pub database: String,
}

impl Default for DbConnection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_POSTGRES_PORT,
            user: String::new(),
            password: String::new(),
            database: String::new(),
        }
    }
}

impl DbConnection {
    /// GDAL connection string for the PostgreSQL driver, in libpq conninfo syntax.
    pub fn connection_string(&self) -> String {
        format!(
            "PG:host={} port={} user={} password={} dbname={}",
            conninfo_value(&self.host),
            self.port,
            conninfo_value(&self.user),
            conninfo_value(&self.password),
            conninfo_value(&self.database),
        )
    }
}

fn text_of_scalar(value: Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        other => Err(format!("expected a scalar, got {:?}", other)),
    }
}

fn optional_scalar_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    text_of_scalar(Value::deserialize(deserializer)?).map_err(de::Error::custom)
}

fn scalar_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    optional_scalar_text(deserializer).map(Option::unwrap_or_default)
}

/// A port written either as a number or as quoted text.
fn port_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let port = match Value::deserialize(deserializer)? {
        Value::Null => return Ok(DEFAULT_POSTGRES_PORT),
        Value::Number(number) => number.as_u64().and_then(|port| u16::try_from(port).ok()),
        Value::String(text) => text.trim().parse::<u16>().ok(),
        _ => None,
    };
    port.ok_or_else(|| de::Error::custom("expected a port number"))
}

fn conninfo_value(value: &str) -> String {
    let needs_quoting =
        value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quoting {
        return value.to_owned();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}
