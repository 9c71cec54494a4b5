use serde::{Deserialize, Serialize};

/// The account that requested a buyer order (a reseller / API client).
///
/// Only the notification-relevant parts are modelled: a linked chat channel
/// for personal messages and a callback URL for webhook delivery.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RequesterAccount {
    pub id: String,
    pub name: String,
    /// Messaging channel linked to this account, if any.
    #[serde(default)]
    pub chat_id: Option<String>,
    /// Callback URL receiving transaction updates, if any.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl RequesterAccount {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            chat_id: None,
            webhook_url: None,
        }
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    /// Linked chat id, ignoring blank values.
    pub fn linked_chat(&self) -> Option<&str> {
        self.chat_id.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Callback URL, ignoring blank values.
    pub fn callback_url(&self) -> Option<&str> {
        self.webhook_url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_channels_are_ignored() {
        let account = RequesterAccount::new("a1", "Reseller")
            .with_chat_id("  ")
            .with_webhook_url("");
        assert!(account.linked_chat().is_none());
        assert!(account.callback_url().is_none());
    }

    #[test]
    fn test_linked_channels() {
        let account = RequesterAccount::new("a1", "Reseller")
            .with_chat_id("42")
            .with_webhook_url("https://reseller.test/hook");
        assert_eq!(account.linked_chat(), Some("42"));
        assert_eq!(account.callback_url(), Some("https://reseller.test/hook"));
    }
}
