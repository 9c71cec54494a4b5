#![allow(dead_code)]

use async_trait::async_trait;
use creditflow::application::mixing::MixingEngine;
use creditflow::application::notifier::NotificationDispatcher;
use creditflow::application::worker::FulfillmentWorker;
use creditflow::automation::client::StorefrontClient;
use creditflow::automation::mock::MockStorefront;
use creditflow::config::{NotifierConfig, StorefrontConfig, WorkerConfig};
use creditflow::domain::order::{BuyerOrder, FulfillmentOrder};
use creditflow::domain::ports::{Messenger, OrderStore, WebhookTransport};
use creditflow::error::Result;
use creditflow::infrastructure::in_memory::{
    InMemoryAccountStore, InMemoryCatalogStore, InMemoryOrderStore, InMemorySessionCache,
};
use creditflow::interfaces::csv::seed_reader::{seed_accounts, seed_catalog};
use creditflow::poll::ManualClock;
use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const CATALOG_FIXTURE: &str = "tests/fixtures/catalog.csv";
pub const ACCOUNTS_FIXTURE: &str = "tests/fixtures/accounts.csv";

/// Supplier id derived from the `STOREFRONT` code in the catalog fixture.
pub const SUPPLIER_ID: &str = "storefront";

#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMessenger {
    pub fn channels(&self) -> Vec<String> {
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

/// Answers with queued status codes, then 200.
#[derive(Default)]
pub struct ScriptedTransport {
    pub answers: Mutex<VecDeque<u16>>,
    pub posts: Mutex<Vec<(String, serde_json::Value)>>,
}

impl ScriptedTransport {
    pub fn answering(codes: &[u16]) -> Self {
        Self {
            answers: Mutex::new(codes.iter().copied().collect()),
            posts: Mutex::default(),
        }
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

#[async_trait]
impl WebhookTransport for ScriptedTransport {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16> {
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(200))
    }
}

/// In-memory pipeline seeded from the CSV fixtures, driving a mock storefront.
pub struct Pipeline {
    pub catalog: Arc<InMemoryCatalogStore>,
    pub accounts: Arc<InMemoryAccountStore>,
    pub orders: Arc<InMemoryOrderStore>,
    pub clock: Arc<ManualClock>,
    pub messenger: Arc<RecordingMessenger>,
    pub transport: Arc<ScriptedTransport>,
    pub mixing: MixingEngine,
    pub worker: FulfillmentWorker,
}

impl Pipeline {
    pub async fn new(mock: &MockStorefront) -> Self {
        Self::with_transport(mock, ScriptedTransport::default()).await
    }

    pub async fn with_transport(mock: &MockStorefront, transport: ScriptedTransport) -> Self {
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let accounts = Arc::new(InMemoryAccountStore::new());
        let orders = Arc::new(InMemoryOrderStore::new());
        seed_catalog(File::open(CATALOG_FIXTURE).unwrap(), catalog.as_ref())
            .await
            .unwrap();
        seed_accounts(File::open(ACCOUNTS_FIXTURE).unwrap(), accounts.as_ref())
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::new());
        let messenger = Arc::new(RecordingMessenger::default());
        let transport = Arc::new(transport);

        let storefront = StorefrontClient::new(
            Arc::new(mock.clone()),
            Arc::new(InMemorySessionCache::new()),
            clock.clone(),
            StorefrontConfig::default()
                .with_entry_url(mock.entry_url())
                .with_credentials("reseller", "secret"),
        );
        let notifier = NotificationDispatcher::new(
            messenger.clone(),
            transport.clone(),
            clock.clone(),
            NotifierConfig::default().with_admin_channel("admin"),
        );
        let worker = FulfillmentWorker::new(
            catalog.clone(),
            accounts.clone(),
            orders.clone(),
            Arc::new(storefront),
            Arc::new(notifier),
            clock.clone(),
            WorkerConfig::default(),
        );
        let mixing = MixingEngine::new(catalog.clone(), orders.clone());

        Self {
            catalog,
            accounts,
            orders,
            clock,
            messenger,
            transport,
            mixing,
            worker,
        }
    }

    /// Records a buyer order and materializes it for the fixture supplier.
    pub async fn submit(
        &self,
        product: &str,
        account: &str,
        quantity: u32,
    ) -> (BuyerOrder, FulfillmentOrder) {
        let buyer = BuyerOrder::new(product, account, "PLAYER-9001", quantity);
        self.orders.store_buyer_order(buyer.clone()).await.unwrap();
        let header = self.mixing.materialize(&buyer, SUPPLIER_ID).await.unwrap();
        (buyer, header)
    }
}

/// Writes a catalog CSV with one single-line recipe `gen-{i}` per multiplier.
pub fn generate_catalog(path: &Path, multipliers: &[u32]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record([
        "product_id",
        "product_name",
        "denomination",
        "price",
        "item_id",
        "external_ref",
        "item_denomination",
        "cost",
        "multiplier",
        "supplier_code",
        "supplier_name",
    ])?;
    for (i, multiplier) in multipliers.iter().enumerate() {
        let product = format!("gen-{i}");
        let multiplier = multiplier.to_string();
        wtr.write_record([
            product.as_str(),
            product.as_str(),
            "1",
            "1000",
            "base-1",
            "BASE-1",
            "1",
            "280",
            multiplier.as_str(),
            "STOREFRONT",
            "Storefront",
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
