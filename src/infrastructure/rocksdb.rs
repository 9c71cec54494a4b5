use crate::domain::account::RequesterAccount;
use crate::domain::catalog::{Product, RecipeLine, Supplier, UpstreamItem};
use crate::domain::order::{
    BuyerOrder, FulfillmentLine, FulfillmentOrder, OrderStatus, StatusUpdate,
};
use crate::domain::ports::{AccountStore, CatalogStore, OrderStore};
use crate::error::{FulfillmentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const CF_PRODUCTS: &str = "products";
pub const CF_ITEMS: &str = "upstream_items";
pub const CF_SUPPLIERS: &str = "suppliers";
/// One value per product: its recipe lines in insertion order.
pub const CF_RECIPES: &str = "recipes";
pub const CF_ACCOUNTS: &str = "accounts";
pub const CF_BUYER_ORDERS: &str = "buyer_orders";
pub const CF_FULFILLMENT_ORDERS: &str = "fulfillment_orders";
/// One value per fulfillment order: all of its lines.
pub const CF_FULFILLMENT_LINES: &str = "fulfillment_lines";

const COLUMN_FAMILIES: [&str; 8] = [
    CF_PRODUCTS,
    CF_ITEMS,
    CF_SUPPLIERS,
    CF_RECIPES,
    CF_ACCOUNTS,
    CF_BUYER_ORDERS,
    CF_FULFILLMENT_ORDERS,
    CF_FULFILLMENT_LINES,
];

/// A persistent store implementation using RocksDB.
///
/// Each entity lives in its own column family as JSON keyed by id. Fulfillment
/// headers and lines are written in one `WriteBatch`. Read-check-write sequences
/// (status compare-and-swap, recipe appends) are serialized by a process-wide
/// mutex shared by all clones.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            FulfillmentError::PersistenceError(format!("column family {name} not found"))
        })
    }

    fn put_json<T: Serialize>(&self, cf: &str, key: &str, value: &T) -> Result<()> {
        let handle = self.cf(cf)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(handle, key.as_bytes(), bytes)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &str) -> Result<Option<T>> {
        let handle = self.cf(cf)?;
        match self.db.get_cf(handle, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let handle = self.cf(cf)?;
        let mut values = Vec::new();
        for entry in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (_key, bytes) = entry?;
            values.push(serde_json::from_slice(&bytes)?);
        }
        Ok(values)
    }
}

#[async_trait]
impl CatalogStore for RocksDBStore {
    async fn store_product(&self, product: Product) -> Result<()> {
        self.put_json(CF_PRODUCTS, &product.id, &product)
    }

    async fn product(&self, id: &str) -> Result<Option<Product>> {
        self.get_json(CF_PRODUCTS, id)
    }

    async fn store_item(&self, item: UpstreamItem) -> Result<()> {
        self.put_json(CF_ITEMS, &item.id, &item)
    }

    async fn item(&self, id: &str) -> Result<Option<UpstreamItem>> {
        self.get_json(CF_ITEMS, id)
    }

    async fn store_supplier(&self, supplier: Supplier) -> Result<()> {
        self.put_json(CF_SUPPLIERS, &supplier.id, &supplier)
    }

    async fn supplier(&self, id: &str) -> Result<Option<Supplier>> {
        self.get_json(CF_SUPPLIERS, id)
    }

    async fn supplier_by_code(&self, code: &str) -> Result<Option<Supplier>> {
        let suppliers: Vec<Supplier> = self.scan_json(CF_SUPPLIERS)?;
        Ok(suppliers.into_iter().find(|s| s.code == code))
    }

    async fn store_recipe_line(&self, line: RecipeLine) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut lines: Vec<RecipeLine> = self
            .get_json(CF_RECIPES, &line.product_id)?
            .unwrap_or_default();
        match lines.iter_mut().find(|l| l.id == line.id) {
            Some(existing) => *existing = line.clone(),
            None => lines.push(line.clone()),
        }
        self.put_json(CF_RECIPES, &line.product_id, &lines)
    }

    async fn recipe_lines(&self, product_id: &str) -> Result<Vec<RecipeLine>> {
        Ok(self.get_json(CF_RECIPES, product_id)?.unwrap_or_default())
    }
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn store(&self, account: RequesterAccount) -> Result<()> {
        self.put_json(CF_ACCOUNTS, &account.id, &account)
    }

    async fn get(&self, account_id: &str) -> Result<Option<RequesterAccount>> {
        self.get_json(CF_ACCOUNTS, account_id)
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn store_buyer_order(&self, order: BuyerOrder) -> Result<()> {
        self.put_json(CF_BUYER_ORDERS, &order.id, &order)
    }

    async fn buyer_order(&self, id: &str) -> Result<Option<BuyerOrder>> {
        self.get_json(CF_BUYER_ORDERS, id)
    }

    async fn update_buyer_status(&self, id: &str, status: OrderStatus) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(mut order) = self.get_json::<BuyerOrder>(CF_BUYER_ORDERS, id)? else {
            return Ok(false);
        };
        if !order.status.buyer_can_transition_to(status) {
            return Ok(false);
        }
        order.status = status;
        order.updated_at = Utc::now();
        self.put_json(CF_BUYER_ORDERS, id, &order)?;
        Ok(true)
    }

    async fn create_fulfillment(
        &self,
        order: FulfillmentOrder,
        lines: Vec<FulfillmentLine>,
    ) -> Result<()> {
        if let Some(stray) = lines.iter().find(|l| l.fulfillment_order_id != order.id) {
            return Err(FulfillmentError::PersistenceError(format!(
                "line {} does not belong to fulfillment order {}",
                stray.id, order.id
            )));
        }
        let _guard = self.write_lock.lock().await;
        let orders = self.cf(CF_FULFILLMENT_ORDERS)?;
        if self.db.get_pinned_cf(orders, order.id.as_bytes())?.is_some() {
            return Err(FulfillmentError::PersistenceError(format!(
                "fulfillment order {} already exists",
                order.id
            )));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(orders, order.id.as_bytes(), serde_json::to_vec(&order)?);
        batch.put_cf(
            self.cf(CF_FULFILLMENT_LINES)?,
            order.id.as_bytes(),
            serde_json::to_vec(&lines)?,
        );
        self.db.write(batch)?;
        Ok(())
    }

    async fn fulfillment_order(&self, id: &str) -> Result<Option<FulfillmentOrder>> {
        self.get_json(CF_FULFILLMENT_ORDERS, id)
    }

    async fn fulfillment_lines(&self, order_id: &str) -> Result<Vec<FulfillmentLine>> {
        Ok(self
            .get_json(CF_FULFILLMENT_LINES, order_id)?
            .unwrap_or_default())
    }

    async fn oldest_pending(&self, supplier_id: &str) -> Result<Option<FulfillmentOrder>> {
        let orders: Vec<FulfillmentOrder> = self.scan_json(CF_FULFILLMENT_ORDERS)?;
        Ok(orders
            .into_iter()
            .filter(|o| o.status == OrderStatus::Pending && o.supplier_id == supplier_id)
            .min_by_key(|o| o.created_at))
    }

    async fn transition(
        &self,
        id: &str,
        expected: OrderStatus,
        update: StatusUpdate,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(mut order) = self.get_json::<FulfillmentOrder>(CF_FULFILLMENT_ORDERS, id)? else {
            return Err(FulfillmentError::PersistenceError(format!(
                "fulfillment order {id} not found"
            )));
        };
        if order.status != expected || !order.apply(&update) {
            return Ok(false);
        }
        self.put_json(CF_FULFILLMENT_ORDERS, id, &order)?;
        Ok(true)
    }

    async fn all_fulfillment_orders(&self) -> Result<Vec<FulfillmentOrder>> {
        let mut orders: Vec<FulfillmentOrder> = self.scan_json(CF_FULFILLMENT_ORDERS)?;
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}
