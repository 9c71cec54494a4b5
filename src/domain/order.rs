use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle shared by buyer orders and fulfillment orders.
///
/// Transitions are monotonic: `pending -> processing -> {success | failed}`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Success | OrderStatus::Failed)
    }

    /// Fulfillment orders always pass through `processing`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Success)
                | (OrderStatus::Processing, OrderStatus::Failed)
        )
    }

    /// Buyer orders may also fail straight from `pending`, when materialization
    /// never produced a fulfillment order.
    pub fn buyer_can_transition_to(self, next: OrderStatus) -> bool {
        self.can_transition_to(next)
            || (self == OrderStatus::Pending && next == OrderStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Success => "success",
            OrderStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer-facing order, created by order intake.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct BuyerOrder {
    pub id: String,
    pub product_id: String,
    pub account_id: String,
    /// Account identifier on the upstream storefront that receives the credit.
    pub destination: String,
    pub quantity: u32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BuyerOrder {
    pub fn new(
        product_id: impl Into<String>,
        account_id: impl Into<String>,
        destination: impl Into<String>,
        quantity: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            product_id: product_id.into(),
            account_id: account_id.into(),
            destination: destination.into(),
            quantity,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Execution-side header driven by the worker.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct FulfillmentOrder {
    pub id: String,
    pub buyer_order_id: String,
    pub supplier_id: String,
    pub status: OrderStatus,
    pub last_error: Option<String>,
    #[serde(default)]
    pub transaction_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FulfillmentOrder {
    pub fn pending(buyer_order_id: impl Into<String>, supplier_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            buyer_order_id: buyer_order_id.into(),
            supplier_id: supplier_id.into(),
            status: OrderStatus::Pending,
            last_error: None,
            transaction_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a status update in place if the transition is allowed.
    pub fn apply(&mut self, update: &StatusUpdate) -> bool {
        if !self.status.can_transition_to(update.status) {
            return false;
        }
        self.status = update.status;
        if update.last_error.is_some() {
            self.last_error = update.last_error.clone();
        }
        if !update.transaction_ids.is_empty() {
            self.transaction_ids = update.transaction_ids.clone();
        }
        self.updated_at = Utc::now();
        true
    }
}

/// One row per upstream item needed by a fulfillment order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct FulfillmentLine {
    pub id: String,
    pub fulfillment_order_id: String,
    pub upstream_item_id: String,
    pub external_ref: String,
    pub quantity: u32,
}

/// What the storefront client needs to buy for one line.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PurchaseLine {
    pub external_ref: String,
    pub quantity: u32,
}

impl From<&FulfillmentLine> for PurchaseLine {
    fn from(line: &FulfillmentLine) -> Self {
        Self {
            external_ref: line.external_ref.clone(),
            quantity: line.quantity,
        }
    }
}

/// Target state of a guarded status write.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    pub last_error: Option<String>,
    pub transaction_ids: Vec<String>,
}

impl StatusUpdate {
    pub fn to(status: OrderStatus) -> Self {
        Self {
            status,
            last_error: None,
            transaction_ids: Vec::new(),
        }
    }

    pub fn succeeded(transaction_ids: Vec<String>) -> Self {
        Self {
            status: OrderStatus::Success,
            last_error: None,
            transaction_ids,
        }
    }

    pub fn failed(reason: impl Into<String>, transaction_ids: Vec<String>) -> Self {
        Self {
            status: OrderStatus::Failed,
            last_error: Some(reason.into()),
            transaction_ids,
        }
    }
}
