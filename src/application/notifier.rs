use crate::config::NotifierConfig;
use crate::domain::account::RequesterAccount;
use crate::domain::catalog::Product;
use crate::domain::order::BuyerOrder;
use crate::domain::ports::{MessengerRef, WebhookTransportRef};
use crate::error::{FulfillmentError, Result};
use crate::poll::{Clock, Poller, RetryPolicy};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything the dispatcher reports about one finished order.
#[derive(Debug, Clone)]
pub struct OrderReport {
    pub fulfillment_order_id: String,
    pub buyer_order: BuyerOrder,
    pub product: Option<Product>,
    pub account: Option<RequesterAccount>,
    pub supplier_name: String,
}

impl OrderReport {
    fn product_name(&self) -> &str {
        self.product
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or(self.buyer_order.product_id.as_str())
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookPayload {
    pub seller_id: String,
    pub message_type: &'static str,
    pub timestamp: String,
    pub data: WebhookData,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookData {
    pub trx_id: String,
    pub ref_id: String,
    pub product_name: String,
    pub code: String,
    pub price: Decimal,
    pub status: &'static str,
    pub status_code: u8,
    pub sn: String,
    pub destination: String,
    pub message: String,
}

impl WebhookPayload {
    pub fn success(
        report: &OrderReport,
        account: &RequesterAccount,
        transaction_ids: &[String],
        at: DateTime<Utc>,
    ) -> Self {
        let order = &report.buyer_order;
        Self {
            seller_id: account.id.clone(),
            message_type: "transaction_update",
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
            data: WebhookData {
                trx_id: order.id.clone(),
                ref_id: order.id.clone(),
                product_name: report.product_name().to_string(),
                code: order.product_id.clone(),
                price: report
                    .product
                    .as_ref()
                    .map(|p| p.price.value())
                    .unwrap_or_default(),
                status: "success",
                status_code: 1,
                sn: transaction_ids.first().cloned().unwrap_or_default(),
                destination: order.destination.clone(),
                message: "Transaction processed successfully".to_string(),
            },
        }
    }
}

/// Escapes text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Relays order outcomes to the admin channel and, when on record, to the
/// requester's chat and callback URL. Deliveries are best-effort: failures
/// are logged and never change order state.
pub struct NotificationDispatcher {
    messenger: MessengerRef,
    webhooks: WebhookTransportRef,
    clock: Arc<dyn Clock>,
    config: NotifierConfig,
}

impl NotificationDispatcher {
    pub fn new(
        messenger: MessengerRef,
        webhooks: WebhookTransportRef,
        clock: Arc<dyn Clock>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            messenger,
            webhooks,
            clock,
            config,
        }
    }

    async fn send(&self, channel: &str, html: &str) {
        if let Err(e) = self.messenger.send(channel, html).await {
            warn!(channel, error = %e, "message not delivered");
        }
    }

    async fn send_admin(&self, html: &str) {
        match self.config.admin_channel.as_deref() {
            Some(channel) => self.send(channel, html).await,
            None => debug!("no admin channel configured, message dropped"),
        }
    }

    pub async fn order_succeeded(&self, report: &OrderReport, transaction_ids: &[String]) {
        let order = &report.buyer_order;
        let sn = transaction_ids.first().map(String::as_str).unwrap_or("-");
        let now = self.clock.wall_time();
        let admin = format!(
            "<b>TRANSACTION SUCCESS</b>\n\n\
             <b>Destination:</b> {}\n\
             <b>Product:</b> {}\n\
             <b>SN / Trx:</b> {}\n\
             <b>Units:</b> {}\n\
             <b>Supplier:</b> {}\n\
             <b>Fulfillment:</b> {}\n\
             <b>Date:</b> {}\n\n\
             <i>Ref ID: {}</i>",
            escape_html(&order.destination),
            escape_html(report.product_name()),
            escape_html(sn),
            transaction_ids.len(),
            escape_html(&report.supplier_name),
            escape_html(&report.fulfillment_order_id),
            now.format(TIMESTAMP_FORMAT),
            escape_html(&order.id),
        );
        self.send_admin(&admin).await;

        let Some(account) = &report.account else {
            debug!(buyer_order_id = %order.id, "no requester account on record");
            return;
        };

        if let Some(chat) = account.linked_chat() {
            let personal = format!(
                "<b>Order completed</b>\n\n\
                 <b>Product:</b> {}\n\
                 <b>Destination:</b> {}\n\
                 <b>Ref ID:</b> {}",
                escape_html(report.product_name()),
                escape_html(&order.destination),
                escape_html(&order.id),
            );
            self.send(chat, &personal).await;
        }

        if let Some(url) = account.callback_url() {
            let payload = WebhookPayload::success(report, account, transaction_ids, now);
            match serde_json::to_value(&payload) {
                Ok(body) => {
                    if let Err(e) = self.deliver_webhook(url, &body).await {
                        warn!(url, error = %e, "webhook abandoned");
                    }
                }
                Err(e) => warn!(error = %e, "webhook payload not serializable"),
            }
        }
    }

    /// Failure notices go to the admin channel only.
    pub async fn order_failed(&self, fulfillment_order_id: &str, reason: &str) {
        let admin = format!(
            "<b>TRANSACTION FAILED</b>\n\n<b>Error:</b> {}\n<b>ID:</b> {}",
            escape_html(reason),
            escape_html(fulfillment_order_id),
        );
        self.send_admin(&admin).await;
    }

    /// Posts `body` until a 2xx answer, at most `webhook_attempts` times with a
    /// fixed delay in between. Returns the number of attempts used.
    pub async fn deliver_webhook(&self, url: &str, body: &serde_json::Value) -> Result<u32> {
        let policy = RetryPolicy::fixed(self.config.webhook_delay, self.config.webhook_attempts);
        let mut poller = Poller::new(self.clock.as_ref(), policy);
        while let Some(attempt) = poller.next().await {
            match self.webhooks.post_json(url, body).await {
                Ok(status) if (200..300).contains(&status) => {
                    info!(url, attempt, "webhook delivered");
                    return Ok(attempt);
                }
                Ok(status) => warn!(url, attempt, status, "webhook answered with non-2xx"),
                Err(e) => warn!(url, attempt, error = %e, "webhook request failed"),
            }
        }
        Err(FulfillmentError::NotificationDeliveryFailed(format!(
            "{url} gave up after {} attempts",
            poller.attempts()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{Money, ProductStatus};
    use crate::domain::ports::{Messenger, WebhookTransport};
    use crate::poll::ManualClock;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingMessenger {
        fn channels(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send(&self, channel_id: &str, html: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((channel_id.to_string(), html.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedTransport {
        answers: Mutex<VecDeque<Result<u16>>>,
        calls: Mutex<Vec<serde_json::Value>>,
    }

    impl ScriptedTransport {
        fn answering(answers: Vec<Result<u16>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl WebhookTransport for ScriptedTransport {
        async fn post_json(&self, _url: &str, body: &serde_json::Value) -> Result<u16> {
            self.calls.lock().unwrap().push(body.clone());
            self.answers.lock().unwrap().pop_front().unwrap_or(Ok(503))
        }
    }

    fn dispatcher(
        messenger: Arc<RecordingMessenger>,
        transport: Arc<ScriptedTransport>,
        clock: Arc<ManualClock>,
    ) -> NotificationDispatcher {
        NotificationDispatcher::new(
            messenger,
            transport,
            clock,
            NotifierConfig::default().with_admin_channel("admin"),
        )
    }

    fn report(account: Option<RequesterAccount>) -> OrderReport {
        OrderReport {
            fulfillment_order_id: "fo-1".into(),
            buyer_order: BuyerOrder::new("coin-5", "acc-1", "PLAYER<7>", 5),
            product: Some(Product {
                id: "coin-5".into(),
                name: "Coin-5".into(),
                denomination: 5,
                price: Money::new(dec!(1500)).unwrap(),
                status: ProductStatus::Active,
            }),
            account,
            supplier_name: "Storefront".into(),
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[tokio::test]
    async fn test_webhook_stops_on_first_2xx() {
        let transport = Arc::new(ScriptedTransport::answering(vec![Ok(500), Ok(204)]));
        let clock = Arc::new(ManualClock::new());
        let notifier = dispatcher(Arc::default(), transport.clone(), clock.clone());

        let attempts = notifier
            .deliver_webhook("http://hook", &serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(transport.calls(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_webhook_gives_up_after_three_attempts() {
        let transport = Arc::new(ScriptedTransport::answering(vec![
            Ok(500),
            Err(FulfillmentError::NotificationDeliveryFailed("connection refused".into())),
            Ok(302),
            Ok(200),
        ]));
        let clock = Arc::new(ManualClock::new());
        let notifier = dispatcher(Arc::default(), transport.clone(), clock.clone());

        let err = notifier
            .deliver_webhook("http://hook", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, FulfillmentError::NotificationDeliveryFailed(_)));
        assert_eq!(transport.calls(), 3);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test]
    async fn test_success_reaches_every_channel_on_record() {
        let messenger = Arc::new(RecordingMessenger::default());
        let transport = Arc::new(ScriptedTransport::answering(vec![Ok(200)]));
        let notifier = dispatcher(messenger.clone(), transport.clone(), Arc::new(ManualClock::new()));
        let account = RequesterAccount::new("acc-1", "Reseller")
            .with_chat_id("777")
            .with_webhook_url("http://hook");
        let ids = vec!["TRX-1-1".to_string(), "TRX-1-2".to_string()];

        notifier.order_succeeded(&report(Some(account)), &ids).await;

        assert_eq!(messenger.channels(), vec!["admin", "777"]);
        let admin_html = messenger.sent.lock().unwrap()[0].1.clone();
        assert!(admin_html.contains("PLAYER&lt;7&gt;"));

        let body = transport.calls.lock().unwrap()[0].clone();
        assert_eq!(body["seller_id"], "acc-1");
        assert_eq!(body["message_type"], "transaction_update");
        assert_eq!(body["data"]["status"], "success");
        assert_eq!(body["data"]["status_code"], 1);
        assert_eq!(body["data"]["sn"], "TRX-1-1");
        assert_eq!(body["data"]["product_name"], "Coin-5");
        assert_eq!(body["data"]["destination"], "PLAYER<7>");
    }

    #[tokio::test]
    async fn test_success_is_stamped_from_the_clock_and_names_the_fulfillment() {
        let messenger = Arc::new(RecordingMessenger::default());
        let transport = Arc::new(ScriptedTransport::answering(vec![Ok(200)]));
        let clock = Arc::new(ManualClock::new());
        clock.advance(Duration::from_secs(61));
        let notifier = dispatcher(messenger.clone(), transport.clone(), clock);
        let account = RequesterAccount::new("acc-1", "Reseller").with_webhook_url("http://hook");

        notifier
            .order_succeeded(&report(Some(account)), &["TRX-1-1".to_string()])
            .await;

        let admin_html = messenger.sent.lock().unwrap()[0].1.clone();
        assert!(admin_html.contains("<b>Fulfillment:</b> fo-1"));
        assert!(admin_html.contains("<b>Date:</b> 2024-01-01 00:01:01"));
        let body = transport.calls.lock().unwrap()[0].clone();
        assert_eq!(body["timestamp"], "2024-01-01 00:01:01");
    }

    #[tokio::test]
    async fn test_success_without_links_only_notifies_admin() {
        let messenger = Arc::new(RecordingMessenger::default());
        let transport = Arc::new(ScriptedTransport::default());
        let notifier = dispatcher(messenger.clone(), transport.clone(), Arc::new(ManualClock::new()));

        let account = RequesterAccount::new("acc-1", "Reseller");
        notifier
            .order_succeeded(&report(Some(account)), &["TRX-1-1".to_string()])
            .await;

        assert_eq!(messenger.channels(), vec!["admin"]);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_goes_to_admin_only() {
        let messenger = Arc::new(RecordingMessenger::default());
        let notifier = dispatcher(messenger.clone(), Arc::default(), Arc::new(ManualClock::new()));

        notifier.order_failed("fo-9", "transaction rejected: insufficient balance").await;

        let sent = messenger.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "admin");
        assert!(sent[0].1.contains("insufficient balance"));
        assert!(sent[0].1.contains("fo-9"));
    }
}
