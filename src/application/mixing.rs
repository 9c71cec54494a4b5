use crate::domain::order::{BuyerOrder, FulfillmentLine, FulfillmentOrder};
use crate::domain::ports::{CatalogStoreRef, OrderStoreRef};
use crate::error::{FulfillmentError, Result};
use tracing::{debug, info};

/// One upstream item and how many units of it an order needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixedItem {
    pub upstream_item_id: String,
    pub external_ref: String,
    pub quantity: u32,
}

/// Expands products into upstream items through their recipes and
/// materializes fulfillment orders.
pub struct MixingEngine {
    catalog: CatalogStoreRef,
    orders: OrderStoreRef,
}

impl MixingEngine {
    pub fn new(catalog: CatalogStoreRef, orders: OrderStoreRef) -> Self {
        Self { catalog, orders }
    }

    /// One entry per recipe line of `product_id`, in recipe order, with
    /// `quantity = multiplier * order_quantity`.
    pub async fn expand(&self, product_id: &str, order_quantity: u32) -> Result<Vec<MixedItem>> {
        if order_quantity == 0 {
            return Err(FulfillmentError::InvalidQuantity(
                "order quantity must be positive".to_string(),
            ));
        }
        let lines = self.catalog.recipe_lines(product_id).await?;
        if lines.is_empty() {
            return Err(FulfillmentError::RecipeNotFound(product_id.to_string()));
        }

        let mut mixed = Vec::with_capacity(lines.len());
        for line in lines {
            let item = self
                .catalog
                .item(&line.upstream_item_id)
                .await?
                .ok_or_else(|| {
                    FulfillmentError::PersistenceError(format!(
                        "recipe line {} references unknown upstream item {}",
                        line.id, line.upstream_item_id
                    ))
                })?;
            mixed.push(MixedItem {
                upstream_item_id: item.id,
                external_ref: item.external_ref,
                quantity: line.scaled(order_quantity)?,
            });
        }
        debug!(product_id, order_quantity, items = mixed.len(), "recipe expanded");
        Ok(mixed)
    }

    /// Creates a pending fulfillment order plus its lines for `order`.
    /// Nothing is persisted unless every step succeeds.
    pub async fn materialize(
        &self,
        order: &BuyerOrder,
        supplier_id: &str,
    ) -> Result<FulfillmentOrder> {
        if self.catalog.supplier(supplier_id).await?.is_none() {
            return Err(FulfillmentError::SupplierInvalid(supplier_id.to_string()));
        }
        let mixed = self.expand(&order.product_id, order.quantity).await?;

        let header = FulfillmentOrder::pending(&order.id, supplier_id);
        let lines = mixed
            .into_iter()
            .enumerate()
            .map(|(i, item)| FulfillmentLine {
                id: format!("{}-{}", header.id, i + 1),
                fulfillment_order_id: header.id.clone(),
                upstream_item_id: item.upstream_item_id,
                external_ref: item.external_ref,
                quantity: item.quantity,
            })
            .collect::<Vec<_>>();

        let line_count = lines.len();
        self.orders.create_fulfillment(header.clone(), lines).await?;
        info!(
            order_id = %header.id,
            buyer_order_id = %order.id,
            lines = line_count,
            "fulfillment order materialized"
        );
        Ok(header)
    }

    /// Loads the buyer order by id, then materializes it.
    pub async fn materialize_by_id(
        &self,
        buyer_order_id: &str,
        supplier_id: &str,
    ) -> Result<FulfillmentOrder> {
        let order = self
            .orders
            .buyer_order(buyer_order_id)
            .await?
            .ok_or_else(|| {
                FulfillmentError::PersistenceError(format!(
                    "buyer order {buyer_order_id} not found"
                ))
            })?;
        self.materialize(&order, supplier_id).await
    }
}
