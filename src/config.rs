//! Runtime configuration assembled from environment variables.

use crate::automation::landmarks::{AutomationTimings, StorefrontLandmarks};
use crate::error::{FulfillmentError, Result};
use serde::Deserialize;
use std::time::Duration;

pub const STOREFRONT_URL_VAR: &str = "STOREFRONT_URL";
pub const STOREFRONT_USERNAME_VAR: &str = "STOREFRONT_USERNAME";
pub const STOREFRONT_PASSWORD_VAR: &str = "STOREFRONT_PASSWORD";

pub const DEFAULT_COOKIE_CACHE_KEY: &str = "storefront:cookies";
pub const DEFAULT_SUPPLIER_CODE: &str = "STOREFRONT";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";

#[derive(Debug, Clone, PartialEq)]
pub struct StorefrontConfig {
    pub entry_url: String,
    pub username: String,
    pub password: String,
    pub cookie_cache_key: String,
    pub cookie_ttl: Duration,
    pub landmarks: StorefrontLandmarks,
    pub timings: AutomationTimings,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            entry_url: String::new(),
            username: String::new(),
            password: String::new(),
            cookie_cache_key: DEFAULT_COOKIE_CACHE_KEY.to_string(),
            cookie_ttl: Duration::from_secs(24 * 60 * 60),
            landmarks: StorefrontLandmarks::default(),
            timings: AutomationTimings::default(),
        }
    }
}

impl StorefrontConfig {
    pub fn with_entry_url(mut self, url: impl Into<String>) -> Self {
        self.entry_url = url.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_cookie_ttl(mut self, ttl: Duration) -> Self {
        self.cookie_ttl = ttl;
        self
    }

    /// Fails when the entry point or credentials are missing.
    pub fn validate(&self) -> Result<()> {
        if self.entry_url.is_empty() {
            return Err(FulfillmentError::Config(format!("{STOREFRONT_URL_VAR} not set")));
        }
        if self.username.is_empty() || self.password.is_empty() {
            return Err(FulfillmentError::Config(format!(
                "{STOREFRONT_USERNAME_VAR} and {STOREFRONT_PASSWORD_VAR} must be set"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Code of the supplier whose pending orders this worker consumes.
    pub supplier_code: String,
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            supplier_code: DEFAULT_SUPPLIER_CODE.to_string(),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl WorkerConfig {
    pub fn with_supplier_code(mut self, code: impl Into<String>) -> Self {
        self.supplier_code = code.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotifierConfig {
    pub bot_token: Option<String>,
    pub admin_channel: Option<String>,
    pub webhook_attempts: u32,
    pub webhook_delay: Duration,
    pub webhook_timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            admin_channel: None,
            webhook_attempts: 3,
            webhook_delay: Duration::from_secs(2),
            webhook_timeout: Duration::from_secs(10),
        }
    }
}

impl NotifierConfig {
    pub fn with_admin_channel(mut self, channel: impl Into<String>) -> Self {
        self.admin_channel = Some(channel.into());
        self
    }

    pub fn with_webhook_delay(mut self, delay: Duration) -> Self {
        self.webhook_delay = delay;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppConfig {
    pub storefront: StorefrontConfig,
    pub worker: WorkerConfig,
    pub notifier: NotifierConfig,
    pub webdriver_url: String,
    pub redis_url: Option<String>,
}

/// Flat view of the recognized variables. Keys are the lowercased variable names.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct EnvSettings {
    storefront_url: String,
    storefront_username: String,
    storefront_password: String,
    order_budget_secs: u64,
    worker_supplier_code: String,
    worker_poll_interval_secs: u64,
    telegram_bot_token: Option<String>,
    telegram_admin_chat_id: Option<String>,
    webdriver_url: String,
    redis_url: Option<String>,
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            storefront_url: String::new(),
            storefront_username: String::new(),
            storefront_password: String::new(),
            order_budget_secs: 600,
            worker_supplier_code: DEFAULT_SUPPLIER_CODE.to_string(),
            worker_poll_interval_secs: 5,
            telegram_bot_token: None,
            telegram_admin_chat_id: None,
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            redis_url: None,
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl AppConfig {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Loads the configuration from an explicit set of variables instead of the environment.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self::load(Some(vars.into_iter().collect()))
    }

    fn load(vars: Option<::config::Map<String, String>>) -> Result<Self> {
        use ::config::{Config as ConfigLib, Environment};

        let settings: EnvSettings = ConfigLib::builder()
            // Values stay strings; credentials like "0812" must keep their leading zero.
            .add_source(Environment::default().ignore_empty(true).source(vars))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| FulfillmentError::Config(e.to_string()))?;
        Ok(Self::from_settings(settings))
    }

    fn from_settings(settings: EnvSettings) -> Self {
        let defaults = EnvSettings::default();

        let mut storefront = StorefrontConfig::default()
            .with_entry_url(non_blank(&settings.storefront_url).unwrap_or_default())
            .with_credentials(
                non_blank(&settings.storefront_username).unwrap_or_default(),
                non_blank(&settings.storefront_password).unwrap_or_default(),
            );
        storefront.timings = storefront
            .timings
            .with_order_budget(Duration::from_secs(settings.order_budget_secs));

        let worker = WorkerConfig::default()
            .with_supplier_code(
                non_blank(&settings.worker_supplier_code).unwrap_or(defaults.worker_supplier_code),
            )
            .with_poll_interval(Duration::from_secs(settings.worker_poll_interval_secs));

        let notifier = NotifierConfig {
            bot_token: settings.telegram_bot_token.as_deref().and_then(non_blank),
            admin_channel: settings.telegram_admin_chat_id.as_deref().and_then(non_blank),
            ..NotifierConfig::default()
        };

        Self {
            storefront,
            worker,
            notifier,
            webdriver_url: non_blank(&settings.webdriver_url).unwrap_or(defaults.webdriver_url),
            redis_url: settings.redis_url.as_deref().and_then(non_blank),
        }
    }
}
