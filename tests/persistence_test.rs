#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: seed the catalog and submit an order
    let mut cmd1 = Command::new(cargo_bin!("creditflow"));
    cmd1.arg("--db-path")
        .arg(&db_path)
        .args(["--catalog", "tests/fixtures/catalog.csv"])
        .args([
            "submit",
            "--product",
            "coin-mix-100",
            "--account",
            "acc-1",
            "--destination",
            "PLAYER-1",
            "--quantity",
            "1",
        ]);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    let fulfillment_id = stdout1
        .lines()
        .nth(1)
        .and_then(|row| row.split(',').nth(1))
        .expect("submit prints the fulfillment id")
        .to_string();

    // 2. Second run: no seeding, the order is still there and pending
    let mut cmd2 = Command::new(cargo_bin!("creditflow"));
    cmd2.arg("--db-path").arg(&db_path).arg("status");

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    assert!(stdout2.contains(&format!("{fulfillment_id},")));
    assert!(stdout2.contains(",storefront,pending,"));

    // 3. Recipes survive too
    let mut cmd3 = Command::new(cargo_bin!("creditflow"));
    cmd3.arg("--db-path")
        .arg(&db_path)
        .args(["expand", "--product", "coin-mix-100", "--quantity", "1"]);

    let output3 = cmd3.output().expect("Failed to execute command");
    assert!(output3.status.success());
    let stdout3 = String::from_utf8_lossy(&output3.stdout);
    assert!(stdout3.contains("BASE-60,1"));
    assert!(stdout3.contains("BASE-1,40"));
}
