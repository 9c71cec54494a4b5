use crate::domain::order::OrderStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FulfillmentError {
    #[error("recipe not found for product {0}")]
    RecipeNotFound(String),
    #[error("supplier {0} is not registered")]
    SupplierInvalid(String),
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),
    #[error("login rejected: {0}")]
    LoginRejected(String),
    #[error("login timed out")]
    LoginTimeout,
    #[error("item {0} not found on storefront")]
    ItemNotFound(String),
    #[error("stock exhausted for item {0}")]
    StockExhausted(String),
    #[error("buyer validation failed: {0}")]
    BuyerValidationFailed(String),
    #[error("buyer validation timed out")]
    BuyerValidationTimeout,
    #[error("transaction rejected: {0}")]
    TransactionRejected(String),
    #[error("no response from storefront after confirm")]
    NoServerResponse,
    #[error("order exceeded its execution budget")]
    DeadlineExceeded,
    #[error("status transition {from} -> {to} is not allowed")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("persistence error: {0}")]
    PersistenceError(String),
    #[error("notification delivery failed: {0}")]
    NotificationDeliveryFailed(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[cfg(feature = "cache-redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

pub type Result<T> = std::result::Result<T, FulfillmentError>;

/// Failure of a multi-unit purchase, with the identifiers of the units that
/// settled before the failing one.
#[derive(Error, Debug)]
#[error("unit {unit}: {source}")]
pub struct PlacementError {
    /// Transaction identifiers of the units settled before `unit`.
    pub completed: Vec<String>,
    /// 1-based index of the failing unit, counted across all lines.
    pub unit: usize,
    #[source]
    pub source: FulfillmentError,
}

impl PlacementError {
    pub fn new(completed: Vec<String>, unit: usize, source: FulfillmentError) -> Self {
        Self {
            completed,
            unit,
            source,
        }
    }
}
