use super::account::RequesterAccount;
use super::catalog::{Product, RecipeLine, Supplier, UpstreamItem};
use super::order::{
    BuyerOrder, FulfillmentLine, FulfillmentOrder, OrderStatus, PurchaseLine, StatusUpdate,
};
use super::session::Cookie;
use crate::error::{PlacementError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn store_product(&self, product: Product) -> Result<()>;
    async fn product(&self, id: &str) -> Result<Option<Product>>;
    async fn store_item(&self, item: UpstreamItem) -> Result<()>;
    async fn item(&self, id: &str) -> Result<Option<UpstreamItem>>;
    async fn store_supplier(&self, supplier: Supplier) -> Result<()>;
    async fn supplier(&self, id: &str) -> Result<Option<Supplier>>;
    async fn supplier_by_code(&self, code: &str) -> Result<Option<Supplier>>;
    async fn store_recipe_line(&self, line: RecipeLine) -> Result<()>;
    /// All recipe lines of a product, in insertion order.
    async fn recipe_lines(&self, product_id: &str) -> Result<Vec<RecipeLine>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn store(&self, account: RequesterAccount) -> Result<()>;
    async fn get(&self, account_id: &str) -> Result<Option<RequesterAccount>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn store_buyer_order(&self, order: BuyerOrder) -> Result<()>;
    async fn buyer_order(&self, id: &str) -> Result<Option<BuyerOrder>>;
    /// Moves a buyer order to `status` if the transition is allowed.
    /// Returns `false` when the current status forbids it.
    async fn update_buyer_status(&self, id: &str, status: OrderStatus) -> Result<bool>;

    /// Persists a header and its lines as one unit: either all rows exist afterwards or none.
    async fn create_fulfillment(
        &self,
        order: FulfillmentOrder,
        lines: Vec<FulfillmentLine>,
    ) -> Result<()>;
    async fn fulfillment_order(&self, id: &str) -> Result<Option<FulfillmentOrder>>;
    async fn fulfillment_lines(&self, order_id: &str) -> Result<Vec<FulfillmentLine>>;
    /// Oldest `pending` fulfillment order of a supplier.
    async fn oldest_pending(&self, supplier_id: &str) -> Result<Option<FulfillmentOrder>>;
    /// Compare-and-swap status write: applies `update` only if the stored status
    /// still equals `expected` and the transition is allowed. Returns whether it applied.
    async fn transition(
        &self,
        id: &str,
        expected: OrderStatus,
        update: StatusUpdate,
    ) -> Result<bool>;
    async fn all_fulfillment_orders(&self) -> Result<Vec<FulfillmentOrder>>;
}

/// TTL-bound key-value cache for the serialized storefront session.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
}

/// Opens headless browser sessions.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>>;
}

/// The capability set the storefront client drives. Selectors are CSS selectors.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;
    async fn current_url(&mut self) -> Result<String>;
    /// Number of elements matching `selector`.
    async fn count(&mut self, selector: &str) -> Result<usize>;
    /// Whether the first element matching `selector` exists and is displayed.
    async fn is_visible(&mut self, selector: &str) -> Result<bool>;
    /// Replaces the value of an input.
    async fn fill(&mut self, selector: &str, value: &str) -> Result<()>;
    async fn input_value(&mut self, selector: &str) -> Result<String>;
    /// Clicks the first match. `force` dispatches the click from script,
    /// ignoring elements overlapping the target.
    async fn click(&mut self, selector: &str, force: bool) -> Result<()>;
    /// Visible text of the first match, `None` when nothing matches.
    async fn text(&mut self, selector: &str) -> Result<Option<String>>;
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;
    async fn cookies(&mut self) -> Result<Vec<Cookie>>;
    async fn set_cookies(&mut self, cookies: &[Cookie]) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Executes purchases against the upstream storefront.
#[async_trait]
pub trait Storefront: Send + Sync {
    /// Buys every unit of every line for `destination`, strictly in order.
    /// Returns one transaction identifier per unit.
    async fn place_order(
        &self,
        destination: &str,
        lines: &[PurchaseLine],
    ) -> std::result::Result<Vec<String>, PlacementError>;
}

/// Sends a formatted (HTML) message to a channel.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, channel_id: &str, html: &str) -> Result<()>;
}

/// Single JSON POST; returns the response status code.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16>;
}

pub type CatalogStoreRef = Arc<dyn CatalogStore>;
pub type AccountStoreRef = Arc<dyn AccountStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type SessionCacheRef = Arc<dyn SessionCache>;
pub type BrowserDriverRef = Arc<dyn BrowserDriver>;
pub type StorefrontRef = Arc<dyn Storefront>;
pub type MessengerRef = Arc<dyn Messenger>;
pub type WebhookTransportRef = Arc<dyn WebhookTransport>;
