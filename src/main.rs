use clap::{Parser, Subcommand};
use creditflow::application::mixing::MixingEngine;
use creditflow::application::notifier::NotificationDispatcher;
use creditflow::application::worker::FulfillmentWorker;
use creditflow::automation::client::StorefrontClient;
use creditflow::config::{AppConfig, DEFAULT_SUPPLIER_CODE};
use creditflow::domain::order::{BuyerOrder, OrderStatus};
use creditflow::domain::ports::{
    AccountStoreRef, CatalogStoreRef, MessengerRef, OrderStoreRef, SessionCacheRef,
};
use creditflow::error::FulfillmentError;
use creditflow::infrastructure::in_memory::{
    InMemoryAccountStore, InMemoryCatalogStore, InMemoryOrderStore, InMemorySessionCache,
};
use creditflow::infrastructure::telegram::{LogMessenger, TelegramMessenger};
use creditflow::infrastructure::webdriver::WebDriver;
use creditflow::infrastructure::webhook::ReqwestWebhookTransport;
use creditflow::interfaces::csv::seed_reader::{seed_accounts, seed_catalog};
use creditflow::interfaces::csv::status_writer::StatusWriter;
use creditflow::poll::TokioClock;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Catalog CSV loaded into the store before the command runs
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Requesting accounts CSV loaded into the store before the command runs
    #[arg(long, global = true)]
    accounts: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the catalog and account files and report what was stored
    Seed,
    /// Show the upstream items a product expands into
    Expand {
        #[arg(long)]
        product: String,
        #[arg(long)]
        quantity: u32,
    },
    /// Record a buyer order and materialize its fulfillment order
    Submit {
        #[arg(long)]
        product: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        destination: String,
        #[arg(long)]
        quantity: u32,
        #[arg(long, default_value = DEFAULT_SUPPLIER_CODE)]
        supplier_code: String,
    },
    /// Print every fulfillment order as CSV
    Status,
    /// Run the fulfillment worker against the storefront
    Work {
        /// Process at most one order, then exit
        #[arg(long)]
        once: bool,
    },
}

struct Stores {
    catalog: CatalogStoreRef,
    accounts: AccountStoreRef,
    orders: OrderStoreRef,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("CREDITFLOW_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn in_memory_stores() -> Stores {
    Stores {
        catalog: Arc::new(InMemoryCatalogStore::new()),
        accounts: Arc::new(InMemoryAccountStore::new()),
        orders: Arc::new(InMemoryOrderStore::new()),
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    use creditflow::infrastructure::rocksdb::RocksDBStore;

    let Some(db_path) = db_path else {
        return Ok(in_memory_stores());
    };
    let store = RocksDBStore::open(db_path).into_diagnostic()?;
    Ok(Stores {
        catalog: Arc::new(store.clone()),
        accounts: Arc::new(store.clone()),
        orders: Arc::new(store),
    })
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

#[cfg(feature = "cache-redis")]
async fn session_cache(redis_url: Option<&str>) -> Result<SessionCacheRef> {
    use creditflow::infrastructure::redis::RedisSessionCache;

    match redis_url {
        Some(url) => Ok(Arc::new(RedisSessionCache::connect(url).await.into_diagnostic()?)),
        None => Ok(Arc::new(InMemorySessionCache::new())),
    }
}

#[cfg(not(feature = "cache-redis"))]
async fn session_cache(redis_url: Option<&str>) -> Result<SessionCacheRef> {
    if redis_url.is_some() {
        warn!("REDIS_URL is set but the 'cache-redis' feature is not enabled; caching sessions in memory");
    }
    Ok(Arc::new(InMemorySessionCache::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let stores = open_stores(cli.db_path)?;

    if let Some(path) = &cli.catalog {
        let file = File::open(path).into_diagnostic()?;
        let summary = seed_catalog(file, stores.catalog.as_ref()).await.into_diagnostic()?;
        info!(rows = summary.rows, rejected = summary.rejected, "catalog loaded");
        if matches!(cli.command, Command::Seed) {
            println!("catalog: {} rows stored, {} rejected", summary.rows, summary.rejected);
        }
    }
    if let Some(path) = &cli.accounts {
        let file = File::open(path).into_diagnostic()?;
        let summary = seed_accounts(file, stores.accounts.as_ref()).await.into_diagnostic()?;
        info!(rows = summary.rows, rejected = summary.rejected, "accounts loaded");
        if matches!(cli.command, Command::Seed) {
            println!("accounts: {} rows stored, {} rejected", summary.rows, summary.rejected);
        }
    }

    match cli.command {
        Command::Seed => Ok(()),
        Command::Expand { product, quantity } => {
            let engine = MixingEngine::new(stores.catalog, stores.orders);
            let mixed = engine.expand(&product, quantity).await.into_diagnostic()?;
            let mut writer = csv::Writer::from_writer(io::stdout().lock());
            writer.write_record(["external_ref", "quantity"]).into_diagnostic()?;
            for item in mixed {
                writer
                    .write_record([item.external_ref, item.quantity.to_string()])
                    .into_diagnostic()?;
            }
            writer.flush().into_diagnostic()
        }
        Command::Submit {
            product,
            account,
            destination,
            quantity,
            supplier_code,
        } => submit(&stores, product, account, destination, quantity, &supplier_code).await,
        Command::Status => {
            let orders = stores.orders.all_fulfillment_orders().await.into_diagnostic()?;
            let mut writer = StatusWriter::new(io::stdout().lock());
            writer.write_orders(&orders).into_diagnostic()
        }
        Command::Work { once } => work(stores, once).await,
    }
}

async fn submit(
    stores: &Stores,
    product: String,
    account: String,
    destination: String,
    quantity: u32,
    supplier_code: &str,
) -> Result<()> {
    if stores.accounts.get(&account).await.into_diagnostic()?.is_none() {
        warn!(account = %account, "submitting for an account that is not registered");
    }
    let order = BuyerOrder::new(product, account, destination, quantity);
    stores
        .orders
        .store_buyer_order(order.clone())
        .await
        .into_diagnostic()?;

    let engine = MixingEngine::new(stores.catalog.clone(), stores.orders.clone());
    let materialized = match stores.catalog.supplier_by_code(supplier_code).await {
        Ok(Some(supplier)) => engine.materialize(&order, &supplier.id).await,
        Ok(None) => Err(FulfillmentError::SupplierInvalid(supplier_code.to_string())),
        Err(e) => Err(e),
    };
    let header = match materialized {
        Ok(header) => header,
        Err(e) => {
            // The buyer order never reaches the worker; close it out.
            stores
                .orders
                .update_buyer_status(&order.id, OrderStatus::Failed)
                .await
                .into_diagnostic()?;
            return Err(e).into_diagnostic();
        }
    };

    let mut writer = csv::Writer::from_writer(io::stdout().lock());
    writer
        .write_record(["buyer_order_id", "fulfillment_order_id", "status"])
        .into_diagnostic()?;
    writer
        .write_record([order.id.as_str(), header.id.as_str(), header.status.as_str()])
        .into_diagnostic()?;
    writer.flush().into_diagnostic()
}

async fn work(stores: Stores, once: bool) -> Result<()> {
    let config = AppConfig::from_env().into_diagnostic()?;
    config.storefront.validate().into_diagnostic()?;

    let clock = Arc::new(TokioClock);
    let driver = WebDriver::new(&config.webdriver_url).into_diagnostic()?;
    let cache = session_cache(config.redis_url.as_deref()).await?;
    let storefront = StorefrontClient::new(
        Arc::new(driver),
        cache,
        clock.clone(),
        config.storefront.clone(),
    );

    let mut notifier_config = config.notifier.clone();
    let messenger: MessengerRef = match notifier_config.bot_token.as_deref() {
        Some(token) => Arc::new(
            TelegramMessenger::new(token, notifier_config.webhook_timeout).into_diagnostic()?,
        ),
        None => {
            warn!("TELEGRAM_BOT_TOKEN not set; notifications go to the log");
            if notifier_config.admin_channel.is_none() {
                notifier_config = notifier_config.with_admin_channel("log");
            }
            Arc::new(LogMessenger)
        }
    };
    let webhooks = ReqwestWebhookTransport::new(notifier_config.webhook_timeout).into_diagnostic()?;
    let notifier = NotificationDispatcher::new(
        messenger,
        Arc::new(webhooks),
        clock.clone(),
        notifier_config,
    );

    let worker = FulfillmentWorker::new(
        stores.catalog,
        stores.accounts,
        stores.orders,
        Arc::new(storefront),
        Arc::new(notifier),
        clock,
        config.worker,
    );

    if once {
        match worker.process_next().await.into_diagnostic()? {
            Some(processed) => {
                // Let the notification finish before the runtime shuts down.
                let _ = processed.notification.await;
                println!(
                    "{},{},{}",
                    processed.order_id,
                    processed.status,
                    processed.transaction_ids.join(";")
                );
            }
            None => info!("no pending orders"),
        }
        return Ok(());
    }

    worker
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}
