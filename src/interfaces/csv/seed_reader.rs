use crate::domain::account::RequesterAccount;
use crate::domain::catalog::{Money, Product, ProductStatus, RecipeLine, Supplier, UpstreamItem};
use crate::domain::ports::{AccountStore, CatalogStore};
use crate::error::{FulfillmentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One recipe line of the catalog seed, with its product, item and supplier inlined.
///
/// ```text
/// product_id,product_name,denomination,price,item_id,external_ref,item_denomination,cost,multiplier,supplier_code,supplier_name
/// coin-5,Coin-5,5,1500,base-1,BASE-1,1,280,1,STOREFRONT,Storefront
/// ```
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CatalogRow {
    pub product_id: String,
    pub product_name: String,
    pub denomination: u32,
    pub price: Decimal,
    pub item_id: String,
    pub external_ref: String,
    pub item_denomination: u32,
    pub cost: Decimal,
    pub multiplier: u32,
    pub supplier_code: String,
    pub supplier_name: String,
}

impl CatalogRow {
    pub fn supplier(&self) -> Supplier {
        Supplier {
            id: self.supplier_code.to_lowercase(),
            name: self.supplier_name.clone(),
            code: self.supplier_code.clone(),
        }
    }

    pub fn product(&self) -> Result<Product> {
        Ok(Product {
            id: self.product_id.clone(),
            name: self.product_name.clone(),
            denomination: self.denomination,
            price: Money::new(self.price)?,
            status: ProductStatus::Active,
        })
    }

    pub fn item(&self) -> Result<UpstreamItem> {
        Ok(UpstreamItem {
            id: self.item_id.clone(),
            external_ref: self.external_ref.clone(),
            denomination: self.item_denomination,
            cost: Money::new(self.cost)?,
            supplier_id: self.supplier_code.to_lowercase(),
        })
    }

    pub fn recipe_line(&self) -> Result<RecipeLine> {
        RecipeLine::new(
            format!("{}:{}", self.product_id, self.item_id),
            &self.product_id,
            &self.item_id,
            self.multiplier,
        )
    }
}

/// One requesting account: `id,name,chat_id,webhook_url`; the last two may be empty.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct AccountRow {
    pub id: String,
    pub name: String,
    pub chat_id: Option<String>,
    pub webhook_url: Option<String>,
}

impl From<AccountRow> for RequesterAccount {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            chat_id: row.chat_id,
            webhook_url: row.webhook_url,
        }
    }
}

/// Reads seed rows from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths.
pub struct SeedReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> SeedReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows of type `T`.
    pub fn rows<T>(self) -> impl Iterator<Item = Result<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(FulfillmentError::from))
    }
}

/// Counts of what a seed run stored.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct SeedSummary {
    pub rows: usize,
    pub rejected: usize,
}

/// Stores every catalog row. Malformed rows are skipped and counted.
pub async fn seed_catalog<R: Read>(source: R, store: &dyn CatalogStore) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();
    for row in SeedReader::new(source).rows::<CatalogRow>() {
        let stored = match row {
            Ok(row) => store_catalog_row(&row, store).await,
            Err(e) => Err(e),
        };
        match stored {
            Ok(()) => summary.rows += 1,
            Err(FulfillmentError::PersistenceError(msg)) => {
                return Err(FulfillmentError::PersistenceError(msg));
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping catalog row");
                summary.rejected += 1;
            }
        }
    }
    Ok(summary)
}

async fn store_catalog_row(row: &CatalogRow, store: &dyn CatalogStore) -> Result<()> {
    let product = row.product()?;
    let item = row.item()?;
    let line = row.recipe_line()?;
    store.store_supplier(row.supplier()).await?;
    store.store_product(product).await?;
    store.store_item(item).await?;
    store.store_recipe_line(line).await
}

/// Stores every account row. Malformed rows are skipped and counted.
pub async fn seed_accounts<R: Read>(source: R, store: &dyn AccountStore) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();
    for row in SeedReader::new(source).rows::<AccountRow>() {
        match row {
            Ok(row) => {
                store.store(row.into()).await?;
                summary.rows += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping account row");
                summary.rejected += 1;
            }
        }
    }
    Ok(summary)
}
