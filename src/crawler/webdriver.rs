use std::{
    path::Path,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use serde_json::{json, Value};

use super::{
    browser::{Browser, ElementRef, Locator, Position},
    CrawlError,
};

/// Key under which W3C WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const CLICKABLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Chrome,
    Firefox,
    Edge,
    InternetExplorer,
}

impl BrowserKind {
    /// Map the browser name used in the configuration file.
    pub fn from_name(browser_name: &str) -> Result<Self, CrawlError> {
        match browser_name {
            "Google Chrome" => Ok(BrowserKind::Chrome),
            "Mozilla Firefox" => Ok(BrowserKind::Firefox),
            "Microsoft Edge" => Ok(BrowserKind::Edge),
            "Internet Explorer" => Ok(BrowserKind::InternetExplorer),
            other => Err(CrawlError::UnsupportedBrowser(other.to_owned())),
        }
    }

    pub fn browser_name(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chrome",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Edge => "MicrosoftEdge",
            BrowserKind::InternetExplorer => "internet explorer",
        }
    }

    /// New-session capabilities. Chromium based browsers and Firefox are pointed at the download
    /// directory and told not to prompt.
    pub fn capabilities(&self, download_directory: &Path) -> Value {
        let download_directory = download_directory.to_string_lossy();
        let mut capabilities = json!({ "browserName": self.browser_name() });
        let vendor_options = match self {
            BrowserKind::Chrome => Some((
                "goog:chromeOptions",
                chromium_download_options(&download_directory),
            )),
            BrowserKind::Edge => Some((
                "ms:edgeOptions",
                chromium_download_options(&download_directory),
            )),
            BrowserKind::Firefox => Some((
                "moz:firefoxOptions",
                json!({
                    "prefs": {
                        "browser.download.folderList": 2,
                        "browser.download.dir": download_directory,
                        "browser.download.useDownloadDir": true,
                        "browser.helperApps.neverAsk.saveToDisk": "application/geo+json,application/json,application/octet-stream"
                    }
                }),
            )),
            BrowserKind::InternetExplorer => None,
        };
        if let Some((key, options)) = vendor_options {
            capabilities[key] = options;
        }
        json!({ "capabilities": { "alwaysMatch": capabilities } })
    }
}

fn chromium_download_options(download_directory: &str) -> Value {
    json!({
        "prefs": {
            "download.default_directory": download_directory,
            "download.prompt_for_download": false
        }
    })
}

impl Locator {
    /// W3C location strategy and selector.
    fn strategy(&self) -> (&'static str, String) {
        match self {
            Locator::Id(id) => ("css selector", format!("[id=\"{}\"]", id.replace('"', "\\\""))),
            Locator::XPath(xpath) => ("xpath", xpath.to_owned()),
        }
    }
}

/// A browser session on a WebDriver server (chromedriver, geckodriver, Selenium, ...).
pub struct WebDriverSession {
    client: reqwest::blocking::Client,
    session_url: String,
    closed: bool,
}

impl WebDriverSession {
    pub fn start(
        webdriver_url: &str,
        kind: BrowserKind,
        download_directory: &Path,
    ) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("gdacs-ingest")
            .build()?;
        let base_url = webdriver_url.trim_end_matches('/');
        log::info!("Starting {:?} session on {}", kind, base_url);
        let response = send(
            client
                .post(format!("{}/session", base_url))
                .json(&kind.capabilities(download_directory)),
        )
        .context("Starting WebDriver session")?;
        let session_id = response["sessionId"]
            .as_str()
            .ok_or_else(|| anyhow!("WebDriver did not return a session id: {}", response))?;
        Ok(Self {
            client,
            session_url: format!("{}/session/{}", base_url, session_id),
            closed: false,
        })
    }

    fn post(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        send(self.client.post(format!("{}{}", self.session_url, path)).json(&body))
    }

    fn get(&self, path: &str) -> anyhow::Result<Value> {
        send(self.client.get(format!("{}{}", self.session_url, path)))
    }

    fn element_flag(&self, element: &ElementRef, flag: &str) -> anyhow::Result<bool> {
        let value = self.get(&format!("/element/{}/{}", element.0, flag))?;
        value
            .as_bool()
            .ok_or_else(|| anyhow!("Expected a boolean for '{}', got {}", flag, value))
    }

    fn try_clickable(&mut self, locator: &Locator) -> anyhow::Result<Option<ElementRef>> {
        let element = match self.find_element(locator) {
            Ok(element) => element,
            Err(err) if is_no_such_element(&err) => return Ok(None),
            Err(err) => return Err(err),
        };
        if self.element_flag(&element, "displayed")? && self.element_flag(&element, "enabled")? {
            Ok(Some(element))
        } else {
            Ok(None)
        }
    }
}

impl Browser for WebDriverSession {
    fn navigate(&mut self, url: &str) -> anyhow::Result<()> {
        self.post("/url", json!({ "url": url })).map(|_| ())
    }

    fn maximize_window(&mut self) -> anyhow::Result<()> {
        self.post("/window/maximize", json!({})).map(|_| ())
    }

    fn find_element(&mut self, locator: &Locator) -> anyhow::Result<ElementRef> {
        let (using, value) = locator.strategy();
        let response = self.post("/element", json!({ "using": using, "value": value }))?;
        element_ref_from_response(&response)
    }

    fn element_position(&mut self, element: &ElementRef) -> anyhow::Result<Position> {
        let rect = self.get(&format!("/element/{}/rect", element.0))?;
        match (rect["x"].as_f64(), rect["y"].as_f64()) {
            (Some(x), Some(y)) => Ok(Position { x, y }),
            _ => Err(anyhow!("Unexpected element rect {}", rect)),
        }
    }

    fn execute_script(&mut self, script: &str) -> anyhow::Result<()> {
        self.post("/execute/sync", json!({ "script": script, "args": [] }))
            .map(|_| ())
    }

    fn wait_for_clickable(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> anyhow::Result<Option<ElementRef>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.try_clickable(locator)? {
                return Ok(Some(element));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(CLICKABLE_POLL_INTERVAL);
        }
    }

    fn click(&mut self, element: &ElementRef) -> anyhow::Result<()> {
        self.post(&format!("/element/{}/click", element.0), json!({}))
            .map(|_| ())
    }

    fn quit(&mut self) -> anyhow::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        send(self.client.delete(&self.session_url)).map(|_| ())
    }
}

/// Send a WebDriver command and unwrap the `value` member of the response.
fn send(request: reqwest::blocking::RequestBuilder) -> anyhow::Result<Value> {
    let response = request.send()?;
    let status = response.status();
    let body: Value = response.json()?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if !status.is_success() {
        return Err(webdriver_error(&value).into());
    }
    Ok(value)
}

fn webdriver_error(value: &Value) -> CrawlError {
    CrawlError::WebDriver {
        error: value["error"].as_str().unwrap_or("unknown error").to_owned(),
        message: value["message"].as_str().unwrap_or_default().to_owned(),
    }
}

fn is_no_such_element(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<CrawlError>(),
        Some(CrawlError::WebDriver { error, .. }) if error == "no such element"
    )
}

fn element_ref_from_response(value: &Value) -> anyhow::Result<ElementRef> {
    value[ELEMENT_KEY]
        .as_str()
        .map(|id| ElementRef(id.to_owned()))
        .ok_or_else(|| anyhow!("Response does not reference an element: {}", value))
}
