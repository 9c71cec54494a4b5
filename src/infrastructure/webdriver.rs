//! W3C WebDriver adapter (chromedriver, selenium) over plain HTTP.

use crate::domain::ports::{BrowserDriver, BrowserSession};
use crate::domain::session::Cookie;
use crate::error::{FulfillmentError, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key of an element reference in W3C responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; SM-G960F) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Mobile Safari/537.36";

fn browser_error(e: reqwest::Error) -> FulfillmentError {
    FulfillmentError::Browser(e.to_string())
}

/// Opens headless Chrome sessions on a WebDriver endpoint.
#[derive(Clone)]
pub struct WebDriver {
    http: reqwest::Client,
    endpoint: String,
    headless: bool,
}

impl WebDriver {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(browser_error)?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            headless: true,
        })
    }

    /// Shows the browser window; for debugging against a local driver.
    pub fn headed(mut self) -> Self {
        self.headless = false;
        self
    }

    fn capabilities(&self) -> Value {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-setuid-sandbox".to_string(),
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--window-size=375,812".to_string(),
            format!("--user-agent={MOBILE_USER_AGENT}"),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserDriver for WebDriver {
    async fn open(&self) -> Result<Box<dyn BrowserSession>> {
        let url = format!("{}/session", self.endpoint);
        let value = send(&self.http, Method::POST, &url, Some(self.capabilities())).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| FulfillmentError::Browser("driver returned no session id".to_string()))?;
        info!(session_id, "browser session opened");
        Ok(Box::new(WebDriverSession {
            http: self.http.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
            closed: false,
        }))
    }
}

/// Sends one command and unwraps the `value` member of the response.
async fn send(http: &reqwest::Client, method: Method, url: &str, body: Option<Value>) -> Result<Value> {
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.map_err(browser_error)?;
    let status = response.status();
    let payload: Value = response.json().await.map_err(browser_error)?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if !status.is_success() {
        let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
        return Err(FulfillmentError::Browser(format!("{error}: {message}")));
    }
    Ok(value)
}

pub struct WebDriverSession {
    http: reqwest::Client,
    base: String,
    closed: bool,
}

impl WebDriverSession {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base, path);
        debug!(%url, "webdriver command");
        send(&self.http, method, &url, body).await
    }

    async fn elements(&self, selector: &str) -> Result<Vec<String>> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        Ok(value
            .as_array()
            .map(|found| {
                found
                    .iter()
                    .filter_map(|e| e.get(ELEMENT_KEY).and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn first(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.elements(selector).await?.into_iter().next())
    }

    async fn require(&self, selector: &str) -> Result<String> {
        self.first(selector)
            .await?
            .ok_or_else(|| FulfillmentError::Browser(format!("no element matches {selector}")))
    }
}

fn element_ref(element: &str) -> Value {
    let mut reference = serde_json::Map::new();
    reference.insert(ELEMENT_KEY.to_string(), Value::String(element.to_string()));
    Value::Object(reference)
}

fn cookie_to_wire(cookie: &Cookie) -> Value {
    let mut wire = json!({
        "name": cookie.name,
        "value": cookie.value,
        "path": cookie.path.clone().unwrap_or_else(|| "/".to_string()),
        "secure": cookie.secure,
        "httpOnly": cookie.http_only,
    });
    if let Some(domain) = &cookie.domain {
        wire["domain"] = json!(domain);
    }
    if let Some(expiry) = cookie.expiry {
        wire["expiry"] = json!(expiry);
    }
    if let Some(same_site) = &cookie.same_site {
        wire["sameSite"] = json!(same_site);
    }
    wire
}

fn cookie_from_wire(wire: &Value) -> Option<Cookie> {
    let text = |key: &str| wire.get(key).and_then(Value::as_str).map(str::to_string);
    Some(Cookie {
        name: text("name")?,
        value: text("value")?,
        domain: text("domain"),
        path: text("path"),
        expiry: wire.get("expiry").and_then(Value::as_i64),
        http_only: wire.get("httpOnly").and_then(Value::as_bool).unwrap_or(false),
        secure: wire.get("secure").and_then(Value::as_bool).unwrap_or(false),
        same_site: text("sameSite"),
    })
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn current_url(&mut self) -> Result<String> {
        let value = self.command(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn count(&mut self, selector: &str) -> Result<usize> {
        Ok(self.elements(selector).await?.len())
    }

    async fn is_visible(&mut self, selector: &str) -> Result<bool> {
        let Some(element) = self.first(selector).await? else {
            return Ok(false);
        };
        let value = self
            .command(Method::GET, &format!("/element/{element}/displayed"), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        let element = self.require(selector).await?;
        self.command(Method::POST, &format!("/element/{element}/clear"), Some(json!({})))
            .await?;
        self.command(
            Method::POST,
            &format!("/element/{element}/value"),
            Some(json!({ "text": value })),
        )
        .await
        .map(|_| ())
    }

    async fn input_value(&mut self, selector: &str) -> Result<String> {
        let element = self.require(selector).await?;
        let value = self
            .command(Method::GET, &format!("/element/{element}/property/value"), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn click(&mut self, selector: &str, force: bool) -> Result<()> {
        let element = self.require(selector).await?;
        if force {
            self.command(
                Method::POST,
                "/execute/sync",
                Some(json!({
                    "script": "arguments[0].click();",
                    "args": [element_ref(&element)]
                })),
            )
            .await?;
        } else {
            self.command(Method::POST, &format!("/element/{element}/click"), Some(json!({})))
                .await?;
        }
        Ok(())
    }

    async fn text(&mut self, selector: &str) -> Result<Option<String>> {
        let Some(element) = self.first(selector).await? else {
            return Ok(None);
        };
        let value = self
            .command(Method::GET, &format!("/element/{element}/text"), None)
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }

    async fn cookies(&mut self) -> Result<Vec<Cookie>> {
        let value = self.command(Method::GET, "/cookie", None).await?;
        Ok(value
            .as_array()
            .map(|all| all.iter().filter_map(cookie_from_wire).collect())
            .unwrap_or_default())
    }

    async fn set_cookies(&mut self, cookies: &[Cookie]) -> Result<()> {
        for cookie in cookies {
            if let Err(e) = self
                .command(
                    Method::POST,
                    "/cookie",
                    Some(json!({ "cookie": cookie_to_wire(cookie) })),
                )
                .await
            {
                warn!(cookie = %cookie.name, error = %e, "cookie rejected by browser");
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.command(Method::DELETE, "", None).await?;
        info!("browser session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_request_mobile_headless_chrome() {
        let driver = WebDriver::new("http://localhost:4444/").unwrap();
        assert_eq!(driver.endpoint, "http://localhost:4444");

        let caps = driver.capabilities();
        let args = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        let args: Vec<_> = args.iter().filter_map(Value::as_str).collect();
        assert!(args.contains(&"--no-sandbox"));
        assert!(args.contains(&"--window-size=375,812"));
        assert!(args.contains(&"--headless=new"));

        let headed = driver.headed().capabilities();
        let args = headed["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        assert!(!args.iter().any(|a| a == "--headless=new"));
    }

    #[test]
    fn test_cookie_wire_mapping() {
        let mut cookie = Cookie::new("sid", "abc");
        cookie.http_only = true;
        cookie.expiry = Some(1_900_000_000);

        let wire = cookie_to_wire(&cookie);
        assert_eq!(wire["httpOnly"], json!(true));
        assert!(wire.get("domain").is_none());

        let back = cookie_from_wire(&wire).unwrap();
        assert_eq!(back, cookie);
        assert!(cookie_from_wire(&json!({ "value": "orphan" })).is_none());
    }
}
