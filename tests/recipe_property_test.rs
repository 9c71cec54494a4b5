mod common;

use common::generate_catalog;
use creditflow::application::mixing::MixingEngine;
use creditflow::domain::ports::OrderStore;
use creditflow::error::FulfillmentError;
use creditflow::infrastructure::in_memory::{InMemoryCatalogStore, InMemoryOrderStore};
use creditflow::interfaces::csv::seed_reader::seed_catalog;
use rand::Rng;
use std::fs::File;
use std::sync::Arc;

#[tokio::test]
async fn test_expansion_scales_every_line_by_order_quantity() {
    let mut rng = rand::thread_rng();
    let multipliers: Vec<u32> = (0..50).map(|_| rng.gen_range(1..=500)).collect();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.csv");
    generate_catalog(&path, &multipliers).unwrap();

    let catalog = Arc::new(InMemoryCatalogStore::new());
    let orders = Arc::new(InMemoryOrderStore::new());
    let summary = seed_catalog(File::open(&path).unwrap(), catalog.as_ref())
        .await
        .unwrap();
    assert_eq!(summary.rows, multipliers.len());
    assert_eq!(summary.rejected, 0);

    let engine = MixingEngine::new(catalog, orders.clone());
    for (i, multiplier) in multipliers.iter().enumerate() {
        let quantity = rng.gen_range(1..=1_000);
        let mixed = engine.expand(&format!("gen-{i}"), quantity).await.unwrap();
        assert_eq!(mixed.len(), 1);
        assert_eq!(mixed[0].external_ref, "BASE-1");
        assert_eq!(mixed[0].quantity, multiplier * quantity);
    }
    assert!(orders.all_fulfillment_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expansion_rejects_overflowing_quantities() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.csv");
    generate_catalog(&path, &[1_000]).unwrap();

    let catalog = Arc::new(InMemoryCatalogStore::new());
    seed_catalog(File::open(&path).unwrap(), catalog.as_ref())
        .await
        .unwrap();
    let engine = MixingEngine::new(catalog, Arc::new(InMemoryOrderStore::new()));

    let limit = u32::MAX / 1_000;
    assert!(engine.expand("gen-0", limit).await.is_ok());
    assert!(matches!(
        engine.expand("gen-0", limit + 1).await,
        Err(FulfillmentError::InvalidQuantity(_))
    ));
}
