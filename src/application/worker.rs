use super::notifier::{NotificationDispatcher, OrderReport};
use crate::config::WorkerConfig;
use crate::domain::order::{
    BuyerOrder, FulfillmentOrder, OrderStatus, PurchaseLine, StatusUpdate,
};
use crate::domain::ports::{AccountStoreRef, CatalogStoreRef, OrderStoreRef, StorefrontRef};
use crate::error::{FulfillmentError, Result};
use crate::poll::Clock;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of one processed order.
#[derive(Debug)]
pub struct Processed {
    pub order_id: String,
    pub status: OrderStatus,
    pub transaction_ids: Vec<String>,
    /// The notification task; the worker never waits for it.
    pub notification: JoinHandle<()>,
}

/// Why a claimed order failed, plus whatever units settled before.
struct Failure {
    reason: String,
    completed: Vec<String>,
}

impl Failure {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            completed: Vec::new(),
        }
    }
}

impl From<FulfillmentError> for Failure {
    fn from(e: FulfillmentError) -> Self {
        Self::new(e.to_string())
    }
}

/// Single sequential consumer of pending fulfillment orders for one supplier.
pub struct FulfillmentWorker {
    catalog: CatalogStoreRef,
    accounts: AccountStoreRef,
    orders: OrderStoreRef,
    storefront: StorefrontRef,
    notifier: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
}

impl FulfillmentWorker {
    pub fn new(
        catalog: CatalogStoreRef,
        accounts: AccountStoreRef,
        orders: OrderStoreRef,
        storefront: StorefrontRef,
        notifier: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            catalog,
            accounts,
            orders,
            storefront,
            notifier,
            clock,
            config,
        }
    }

    /// Claims and executes the oldest pending order of the configured supplier.
    ///
    /// Returns `Ok(None)` when there is nothing to do or another worker won the
    /// claim. Purchase failures are recorded on the order and are not errors here.
    pub async fn process_next(&self) -> Result<Option<Processed>> {
        let supplier = self
            .catalog
            .supplier_by_code(&self.config.supplier_code)
            .await?
            .ok_or_else(|| FulfillmentError::SupplierInvalid(self.config.supplier_code.clone()))?;

        let Some(order) = self.orders.oldest_pending(&supplier.id).await? else {
            return Ok(None);
        };
        let claimed = self
            .orders
            .transition(
                &order.id,
                OrderStatus::Pending,
                StatusUpdate::to(OrderStatus::Processing),
            )
            .await?;
        if !claimed {
            debug!(order_id = %order.id, "order claimed by another worker");
            return Ok(None);
        }
        info!(order_id = %order.id, buyer_order_id = %order.buyer_order_id, "order claimed");

        // From here on every error lands on the order; nothing may leave it in `processing`.
        let (buyer, outcome) = match self.orders.buyer_order(&order.buyer_order_id).await {
            Ok(Some(buyer)) => {
                let outcome = self.purchase(&order, &buyer).await;
                (Some(buyer), outcome)
            }
            Ok(None) => (
                None,
                Err(Failure::new(format!(
                    "buyer order {} not found",
                    order.buyer_order_id
                ))),
            ),
            Err(e) => (None, Err(Failure::from(e))),
        };

        match outcome {
            Ok(transaction_ids) => {
                self.finish(&order, StatusUpdate::succeeded(transaction_ids.clone()))
                    .await?;
                info!(order_id = %order.id, units = transaction_ids.len(), "order succeeded");

                let notification = match buyer {
                    Some(buyer) => {
                        let report = self.report(&order, buyer, supplier.name).await;
                        let notifier = self.notifier.clone();
                        let ids = transaction_ids.clone();
                        tokio::spawn(async move { notifier.order_succeeded(&report, &ids).await })
                    }
                    None => tokio::spawn(async {}),
                };
                Ok(Some(Processed {
                    order_id: order.id,
                    status: OrderStatus::Success,
                    transaction_ids,
                    notification,
                }))
            }
            Err(failure) => {
                warn!(order_id = %order.id, reason = %failure.reason, "order failed");
                let update = StatusUpdate::failed(failure.reason.clone(), failure.completed.clone());
                self.finish(&order, update).await?;

                let notifier = self.notifier.clone();
                let order_id = order.id.clone();
                let reason = failure.reason;
                let notification =
                    tokio::spawn(async move { notifier.order_failed(&order_id, &reason).await });
                Ok(Some(Processed {
                    order_id: order.id,
                    status: OrderStatus::Failed,
                    transaction_ids: failure.completed,
                    notification,
                }))
            }
        }
    }

    async fn purchase(
        &self,
        order: &FulfillmentOrder,
        buyer: &BuyerOrder,
    ) -> std::result::Result<Vec<String>, Failure> {
        if !self
            .orders
            .update_buyer_status(&buyer.id, OrderStatus::Processing)
            .await?
        {
            debug!(buyer_order_id = %buyer.id, status = %buyer.status, "buyer order not moved to processing");
        }

        let lines = self.orders.fulfillment_lines(&order.id).await?;
        if lines.is_empty() {
            return Err(Failure::new("no items found for this order"));
        }
        let purchase: Vec<PurchaseLine> = lines.iter().map(PurchaseLine::from).collect();

        self.storefront
            .place_order(&buyer.destination, &purchase)
            .await
            .map_err(|e| {
                warn!(order_id = %order.id, unit = e.unit, settled = e.completed.len(), "purchase aborted");
                Failure {
                    reason: e.source.to_string(),
                    completed: e.completed,
                }
            })
    }

    /// Writes the terminal status and mirrors it onto the buyer order.
    async fn finish(&self, order: &FulfillmentOrder, update: StatusUpdate) -> Result<()> {
        let status = update.status;
        let written = match self
            .orders
            .transition(&order.id, OrderStatus::Processing, update)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(FulfillmentError::InvalidTransition {
                from: OrderStatus::Processing,
                to: status,
            }),
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            error!(order_id = %order.id, %status, error = %e, "terminal status not recorded");
            return Err(e);
        }

        match self
            .orders
            .update_buyer_status(&order.buyer_order_id, status)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(buyer_order_id = %order.buyer_order_id, %status, "buyer order status not propagated")
            }
            Err(e) => {
                warn!(buyer_order_id = %order.buyer_order_id, error = %e, "buyer order status not propagated")
            }
        }
        Ok(())
    }

    async fn report(&self, order: &FulfillmentOrder, buyer: BuyerOrder, supplier_name: String) -> OrderReport {
        let product = match self.catalog.product(&buyer.product_id).await {
            Ok(product) => product,
            Err(e) => {
                warn!(error = %e, "product lookup for notification failed");
                None
            }
        };
        let account = match self.accounts.get(&buyer.account_id).await {
            Ok(account) => account,
            Err(e) => {
                warn!(error = %e, "account lookup for notification failed");
                None
            }
        };
        OrderReport {
            fulfillment_order_id: order.id.clone(),
            buyer_order: buyer,
            product,
            account,
            supplier_name,
        }
    }

    /// Polls until `shutdown` resolves. Per-order errors are logged and never
    /// stop the loop; failed orders are not re-queued.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(supplier = %self.config.supplier_code, "worker started");
        loop {
            match self.process_next().await {
                Ok(Some(processed)) => {
                    debug!(order_id = %processed.order_id, status = %processed.status, "iteration done")
                }
                Ok(None) => debug!("no pending orders"),
                Err(e) => error!(error = %e, "worker iteration failed"),
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.clock.sleep(self.config.poll_interval) => {}
            }
        }
        info!("worker stopped");
    }
}
