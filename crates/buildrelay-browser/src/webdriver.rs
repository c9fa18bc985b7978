//! Minimal W3C WebDriver client over reqwest.
//!
//! Covers the commands the submission sequence needs: session lifecycle,
//! navigation, element lookup, state queries, click, typing and script
//! execution.

use async_trait::async_trait;
use buildrelay_core::WebDriverConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::{Browser, ElementRef};
use crate::chromedriver::ChromeDriverProcess;
use crate::error::{BrowserError, BrowserResult};
use crate::locator::Locator;

/// Key under which W3C drivers return element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

const FORCE_CLICK_SCRIPT: &str =
    "arguments[0].scrollIntoView(true); arguments[0].click();";

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

/// Chrome launch arguments for `config`.
pub fn chrome_args(config: &WebDriverConfig) -> Vec<String> {
    let mut args = Vec::new();
    if config.headless {
        args.push("--headless=new".to_string());
    }
    args.extend(
        ["--no-sandbox", "--disable-dev-shm-usage", "--disable-gpu"]
            .iter()
            .map(|s| s.to_string()),
    );
    let (width, height) = config.window_size;
    args.push(format!("--window-size={width},{height}"));
    args
}

/// New-session request body.
pub fn session_request(config: &WebDriverConfig) -> Value {
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": { "args": chrome_args(config) }
            }
        }
    })
}

/// Unwrap a WebDriver response body: `{"value": ...}`, or an error object.
pub fn parse_response(status: u16, body: &str) -> BrowserResult<Value> {
    let mut parsed: Value = serde_json::from_str(body)
        .map_err(|e| BrowserError::Transport(format!("HTTP {status}: invalid JSON: {e}")))?;
    let value = parsed
        .get_mut("value")
        .map(Value::take)
        .unwrap_or(Value::Null);

    if let Ok(err) = serde_json::from_value::<WireError>(value.clone()) {
        if !(200..300).contains(&status) || !err.error.is_empty() {
            return Err(BrowserError::from_wire(&err.error, &err.message));
        }
    }
    if !(200..300).contains(&status) {
        return Err(BrowserError::Transport(format!("HTTP {status}: {body}")));
    }
    Ok(value)
}

fn element_id(value: &Value) -> BrowserResult<ElementRef> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
        .ok_or_else(|| BrowserError::Transport(format!("not an element reference: {value}")))
}

/// One WebDriver session, optionally owning the chromedriver it talks to.
pub struct WebDriverSession {
    http: reqwest::Client,
    /// `{server}/session/{id}`
    session_url: String,
    driver: Mutex<Option<ChromeDriverProcess>>,
}

impl WebDriverSession {
    /// Open a session on the WebDriver server at `server_url`.
    pub async fn start(server_url: &str, config: &WebDriverConfig) -> BrowserResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(COMMAND_TIMEOUT)
            .build()
            .map_err(|e| BrowserError::Transport(e.to_string()))?;
        let base = server_url.trim_end_matches('/');

        let value = send(
            &http,
            reqwest::Method::POST,
            &format!("{base}/session"),
            Some(session_request(config)),
        )
        .await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BrowserError::Transport("new session response has no sessionId".to_string())
            })?;
        info!(session = session_id, "WebDriver session started");

        Ok(Self {
            http,
            session_url: format!("{base}/session/{session_id}"),
            driver: Mutex::new(None),
        })
    }

    /// Spawn chromedriver from `config.chromedriver_path` and open a session on it.
    pub async fn launch_chromedriver(config: &WebDriverConfig) -> BrowserResult<Self> {
        let path = config
            .chromedriver_path
            .as_deref()
            .ok_or_else(|| BrowserError::Process("no chromedriver_path configured".to_string()))?;
        let process = ChromeDriverProcess::spawn(path).await?;
        match Self::start(&process.url(), config).await {
            Ok(session) => {
                *session.driver.lock().await = Some(process);
                Ok(session)
            }
            Err(e) => {
                process.shutdown().await;
                Err(e)
            }
        }
    }

    async fn command(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> BrowserResult<Value> {
        send(&self.http, method, &format!("{}{path}", self.session_url), body).await
    }

    async fn element_command(
        &self,
        element: &ElementRef,
        suffix: &str,
        body: Option<Value>,
    ) -> BrowserResult<Value> {
        let method = if body.is_some() {
            reqwest::Method::POST
        } else {
            reqwest::Method::GET
        };
        self.command(method, &format!("/element/{}/{suffix}", element.0), body)
            .await
    }
}

async fn send(
    http: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Option<Value>,
) -> BrowserResult<Value> {
    debug!(method = %method, url, "WebDriver command");
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .send()
        .await
        .map_err(|e| BrowserError::Transport(format!("{url}: {e}")))?;
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| BrowserError::Transport(format!("{url}: {e}")))?;
    parse_response(status, &text)
}

#[async_trait]
impl Browser for WebDriverSession {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        self.command(reqwest::Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn find(&self, locator: &Locator) -> BrowserResult<Option<ElementRef>> {
        let (using, value) = locator.to_wire();
        let body = json!({ "using": using, "value": value });
        match self.command(reqwest::Method::POST, "/element", Some(body)).await {
            Ok(found) => element_id(&found).map(Some),
            Err(BrowserError::NoSuchElement(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn is_clickable(&self, element: &ElementRef) -> BrowserResult<bool> {
        let displayed = self.element_command(element, "displayed", None).await?;
        if displayed.as_bool() != Some(true) {
            return Ok(false);
        }
        let enabled = self.element_command(element, "enabled", None).await?;
        Ok(enabled.as_bool() == Some(true))
    }

    async fn click(&self, element: &ElementRef) -> BrowserResult<()> {
        self.element_command(element, "click", Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn force_click(&self, element: &ElementRef) -> BrowserResult<()> {
        let body = json!({
            "script": FORCE_CLICK_SCRIPT,
            "args": [{ ELEMENT_KEY: element.0 }],
        });
        self.command(reqwest::Method::POST, "/execute/sync", Some(body))
            .await
            .map(|_| ())
    }

    async fn clear_and_type(&self, element: &ElementRef, text: &str) -> BrowserResult<()> {
        self.element_command(element, "clear", Some(json!({})))
            .await?;
        self.element_command(element, "value", Some(json!({ "text": text })))
            .await
            .map(|_| ())
    }

    async fn quit(&self) -> BrowserResult<()> {
        let deleted = self.command(reqwest::Method::DELETE, "", None).await;
        if let Err(e) = &deleted {
            warn!(error = %e, "Failed to delete WebDriver session");
        }
        if let Some(process) = self.driver.lock().await.take() {
            process.shutdown().await;
        }
        deleted.map(|_| ())
    }
}
