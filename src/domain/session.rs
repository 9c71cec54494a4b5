use serde::{Deserialize, Serialize};

/// A browser cookie in a driver-independent shape, serializable for the session cache.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Expiry as unix seconds.
    #[serde(default)]
    pub expiry: Option<i64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: Some("/".to_string()),
            expiry: None,
            http_only: false,
            secure: false,
            same_site: None,
        }
    }
}
