use crate::domain::account::RequesterAccount;
use crate::domain::catalog::{Product, RecipeLine, Supplier, UpstreamItem};
use crate::domain::order::{
    BuyerOrder, FulfillmentLine, FulfillmentOrder, OrderStatus, StatusUpdate,
};
use crate::domain::ports::{AccountStore, CatalogStore, OrderStore, SessionCache};
use crate::error::{FulfillmentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Default)]
struct CatalogTables {
    products: HashMap<String, Product>,
    items: HashMap<String, UpstreamItem>,
    suppliers: HashMap<String, Supplier>,
    recipe_lines: Vec<RecipeLine>,
}

/// A thread-safe in-memory catalog: products, upstream items, suppliers and recipes.
#[derive(Default, Clone)]
pub struct InMemoryCatalogStore {
    tables: Arc<RwLock<CatalogTables>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn store_product(&self, product: Product) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn product(&self, id: &str) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(id).cloned())
    }

    async fn store_item(&self, item: UpstreamItem) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.items.insert(item.id.clone(), item);
        Ok(())
    }

    async fn item(&self, id: &str) -> Result<Option<UpstreamItem>> {
        Ok(self.tables.read().await.items.get(id).cloned())
    }

    async fn store_supplier(&self, supplier: Supplier) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.suppliers.insert(supplier.id.clone(), supplier);
        Ok(())
    }

    async fn supplier(&self, id: &str) -> Result<Option<Supplier>> {
        Ok(self.tables.read().await.suppliers.get(id).cloned())
    }

    async fn supplier_by_code(&self, code: &str) -> Result<Option<Supplier>> {
        let tables = self.tables.read().await;
        Ok(tables.suppliers.values().find(|s| s.code == code).cloned())
    }

    async fn store_recipe_line(&self, line: RecipeLine) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.recipe_lines.iter_mut().find(|l| l.id == line.id) {
            Some(existing) => *existing = line,
            None => tables.recipe_lines.push(line),
        }
        Ok(())
    }

    async fn recipe_lines(&self, product_id: &str) -> Result<Vec<RecipeLine>> {
        let tables = self.tables.read().await;
        Ok(tables
            .recipe_lines
            .iter()
            .filter(|l| l.product_id == product_id)
            .cloned()
            .collect())
    }
}

/// A thread-safe in-memory store for requesting accounts.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<String, RequesterAccount>>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn store(&self, account: RequesterAccount) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.id.clone(), account);
        Ok(())
    }

    async fn get(&self, account_id: &str) -> Result<Option<RequesterAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(account_id).cloned())
    }
}

#[derive(Default)]
struct OrderTables {
    buyer_orders: HashMap<String, BuyerOrder>,
    fulfillment_orders: HashMap<String, FulfillmentOrder>,
    /// Fulfillment order ids in creation order.
    creation_order: Vec<String>,
    lines: HashMap<String, Vec<FulfillmentLine>>,
}

/// A thread-safe in-memory order store.
///
/// Every mutation runs under one write lock, which makes header+lines creation
/// atomic and the status compare-and-swap linearizable.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<OrderTables>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn store_buyer_order(&self, order: BuyerOrder) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.buyer_orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn buyer_order(&self, id: &str) -> Result<Option<BuyerOrder>> {
        Ok(self.tables.read().await.buyer_orders.get(id).cloned())
    }

    async fn update_buyer_status(&self, id: &str, status: OrderStatus) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.buyer_orders.get_mut(id) {
            Some(order) if order.status.buyer_can_transition_to(status) => {
                order.status = status;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_fulfillment(
        &self,
        order: FulfillmentOrder,
        lines: Vec<FulfillmentLine>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.fulfillment_orders.contains_key(&order.id) {
            return Err(FulfillmentError::PersistenceError(format!(
                "fulfillment order {} already exists",
                order.id
            )));
        }
        if let Some(stray) = lines.iter().find(|l| l.fulfillment_order_id != order.id) {
            return Err(FulfillmentError::PersistenceError(format!(
                "line {} does not belong to fulfillment order {}",
                stray.id, order.id
            )));
        }
        tables.creation_order.push(order.id.clone());
        tables.lines.insert(order.id.clone(), lines);
        tables.fulfillment_orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn fulfillment_order(&self, id: &str) -> Result<Option<FulfillmentOrder>> {
        Ok(self.tables.read().await.fulfillment_orders.get(id).cloned())
    }

    async fn fulfillment_lines(&self, order_id: &str) -> Result<Vec<FulfillmentLine>> {
        let tables = self.tables.read().await;
        Ok(tables.lines.get(order_id).cloned().unwrap_or_default())
    }

    async fn oldest_pending(&self, supplier_id: &str) -> Result<Option<FulfillmentOrder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .creation_order
            .iter()
            .filter_map(|id| tables.fulfillment_orders.get(id))
            .find(|o| o.status == OrderStatus::Pending && o.supplier_id == supplier_id)
            .cloned())
    }

    async fn transition(
        &self,
        id: &str,
        expected: OrderStatus,
        update: StatusUpdate,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.fulfillment_orders.get_mut(id) {
            Some(order) if order.status == expected => Ok(order.apply(&update)),
            Some(_) => Ok(false),
            None => Err(FulfillmentError::PersistenceError(format!(
                "fulfillment order {id} not found"
            ))),
        }
    }

    async fn all_fulfillment_orders(&self) -> Result<Vec<FulfillmentOrder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .creation_order
            .iter()
            .filter_map(|id| tables.fulfillment_orders.get(id))
            .cloned()
            .collect())
    }
}

/// TTL cache; expired entries are dropped on read.
#[derive(Default, Clone)]
pub struct InMemorySessionCache {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.write().await;
        let expired = match entries.get(key) {
            Some((_, expires_at)) => Instant::now() >= *expires_at,
            None => return Ok(None),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{Money, ProductStatus};
    use rust_decimal_macros::dec;

    fn line_for(order: &FulfillmentOrder, external_ref: &str, quantity: u32) -> FulfillmentLine {
        FulfillmentLine {
            id: format!("{}-{external_ref}", order.id),
            fulfillment_order_id: order.id.clone(),
            upstream_item_id: external_ref.to_lowercase(),
            external_ref: external_ref.to_string(),
            quantity,
        }
    }

    #[tokio::test]
    async fn test_catalog_store_keeps_recipe_order() {
        let store = InMemoryCatalogStore::new();
        store
            .store_product(Product {
                id: "coin-mix-100".into(),
                name: "Coin-Mix-100".into(),
                denomination: 100,
                price: Money::new(dec!(15000)).unwrap(),
                status: ProductStatus::Active,
            })
            .await
            .unwrap();
        store
            .store_recipe_line(RecipeLine::new("r2", "coin-mix-100", "base-60", 1).unwrap())
            .await
            .unwrap();
        store
            .store_recipe_line(RecipeLine::new("r1", "coin-mix-100", "base-1", 40).unwrap())
            .await
            .unwrap();
        store
            .store_recipe_line(RecipeLine::new("r9", "other", "base-1", 1).unwrap())
            .await
            .unwrap();

        let lines = store.recipe_lines("coin-mix-100").await.unwrap();
        let ids: Vec<_> = lines.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
        assert!(store.product("coin-mix-100").await.unwrap().is_some());
        assert!(store.recipe_lines("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_supplier_lookup_by_code() {
        let store = InMemoryCatalogStore::new();
        store
            .store_supplier(Supplier {
                id: "sup-1".into(),
                name: "Storefront".into(),
                code: "STOREFRONT".into(),
            })
            .await
            .unwrap();

        let found = store.supplier_by_code("STOREFRONT").await.unwrap().unwrap();
        assert_eq!(found.id, "sup-1");
        assert!(store.supplier_by_code("OTHER").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_account_store() {
        let store = InMemoryAccountStore::new();
        let account = RequesterAccount::new("acc-1", "Reseller").with_chat_id("42");
        store.store(account.clone()).await.unwrap();

        assert_eq!(store.get("acc-1").await.unwrap(), Some(account));
        assert!(store.get("acc-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oldest_pending_follows_creation_order() {
        let store = InMemoryOrderStore::new();
        let first = FulfillmentOrder::pending("b1", "sup-1");
        let second = FulfillmentOrder::pending("b2", "sup-1");
        let other = FulfillmentOrder::pending("b3", "sup-2");
        for order in [&first, &second, &other] {
            store
                .create_fulfillment(order.clone(), vec![line_for(order, "BASE-1", 1)])
                .await
                .unwrap();
        }

        let oldest = store.oldest_pending("sup-1").await.unwrap().unwrap();
        assert_eq!(oldest.id, first.id);

        assert!(
            store
                .transition(&first.id, OrderStatus::Pending, StatusUpdate::to(OrderStatus::Processing))
                .await
                .unwrap()
        );
        let next = store.oldest_pending("sup-1").await.unwrap().unwrap();
        assert_eq!(next.id, second.id);
        assert_eq!(store.all_fulfillment_orders().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_swap() {
        let store = InMemoryOrderStore::new();
        let order = FulfillmentOrder::pending("b1", "sup-1");
        store
            .create_fulfillment(order.clone(), vec![line_for(&order, "BASE-1", 5)])
            .await
            .unwrap();

        let claim = StatusUpdate::to(OrderStatus::Processing);
        assert!(store.transition(&order.id, OrderStatus::Pending, claim.clone()).await.unwrap());
        assert!(!store.transition(&order.id, OrderStatus::Pending, claim).await.unwrap());

        assert!(
            store
                .transition(&order.id, OrderStatus::Processing, StatusUpdate::failed("boom", vec![]))
                .await
                .unwrap()
        );
        // Terminal: nothing overwrites it, whatever the caller expects.
        assert!(
            !store
                .transition(
                    &order.id,
                    OrderStatus::Failed,
                    StatusUpdate::succeeded(vec!["TRX-1".into()])
                )
                .await
                .unwrap()
        );
        let stored = store.fulfillment_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_transition_of_unknown_order_errors() {
        let store = InMemoryOrderStore::new();
        let result = store
            .transition("nope", OrderStatus::Pending, StatusUpdate::to(OrderStatus::Processing))
            .await;
        assert!(matches!(result, Err(FulfillmentError::PersistenceError(_))));
    }

    #[tokio::test]
    async fn test_create_fulfillment_rejects_foreign_lines_atomically() {
        let store = InMemoryOrderStore::new();
        let order = FulfillmentOrder::pending("b1", "sup-1");
        let foreign = FulfillmentOrder::pending("b2", "sup-1");

        let result = store
            .create_fulfillment(order.clone(), vec![line_for(&foreign, "BASE-1", 1)])
            .await;

        assert!(result.is_err());
        assert!(store.fulfillment_order(&order.id).await.unwrap().is_none());
        assert!(store.fulfillment_lines(&order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_buyer_status_is_monotonic() {
        let store = InMemoryOrderStore::new();
        let order = BuyerOrder::new("coin-5", "acc-1", "PLAYER-1", 5);
        store.store_buyer_order(order.clone()).await.unwrap();

        assert!(store.update_buyer_status(&order.id, OrderStatus::Processing).await.unwrap());
        assert!(store.update_buyer_status(&order.id, OrderStatus::Success).await.unwrap());
        assert!(!store.update_buyer_status(&order.id, OrderStatus::Failed).await.unwrap());
        assert!(!store.update_buyer_status("missing", OrderStatus::Failed).await.unwrap());

        let stored = store.buyer_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Success);
    }

    #[tokio::test]
    async fn test_pending_fails_directly_only_for_buyer_orders() {
        let store = InMemoryOrderStore::new();
        let buyer = BuyerOrder::new("coin-5", "acc-1", "PLAYER-1", 1);
        store.store_buyer_order(buyer.clone()).await.unwrap();
        let order = FulfillmentOrder::pending(&buyer.id, "sup-1");
        store
            .create_fulfillment(order.clone(), vec![line_for(&order, "BASE-1", 1)])
            .await
            .unwrap();

        assert!(
            !store
                .transition(&order.id, OrderStatus::Pending, StatusUpdate::failed("skip", vec![]))
                .await
                .unwrap()
        );
        assert_eq!(
            store.fulfillment_order(&order.id).await.unwrap().unwrap().status,
            OrderStatus::Pending
        );
        assert!(store.update_buyer_status(&buyer.id, OrderStatus::Failed).await.unwrap());
    }

    #[tokio::test]
    async fn test_session_cache_expiry() {
        let cache = InMemorySessionCache::new();
        cache
            .set("live", "cookies".into(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.set("dead", "cookies".into(), Duration::ZERO).await.unwrap();

        assert_eq!(cache.get("live").await.unwrap().as_deref(), Some("cookies"));
        assert!(cache.get("dead").await.unwrap().is_none());
        assert!(cache.get("absent").await.unwrap().is_none());
    }
}
