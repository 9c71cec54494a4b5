//! HTTP transport for account callback URLs.

use crate::domain::ports::WebhookTransport;
use crate::error::{FulfillmentError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Posts JSON with `reqwest` and reports the response status.
///
/// Transport failures (connect, timeout) are errors; any HTTP status, including
/// 5xx, is returned to the caller to classify.
#[derive(Clone)]
pub struct ReqwestWebhookTransport {
    http: reqwest::Client,
}

impl ReqwestWebhookTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FulfillmentError::Config(format!("http client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl WebhookTransport for ReqwestWebhookTransport {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| FulfillmentError::NotificationDeliveryFailed(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}
