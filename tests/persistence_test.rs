#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use gigmarket::application::engine::OrderEngine;
use gigmarket::config::EngineConfig;
use gigmarket::domain::actor::Actor;
use gigmarket::domain::money::Balance;
use gigmarket::domain::order::OrderStatus;
use gigmarket::infrastructure::gateway::StubPaymentGateway;
use gigmarket::infrastructure::rocksdb::RocksDBStore;
use rust_decimal_macros::dec;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

mod common;
use common::{BUYER, SELLER};

fn open_engine(path: &Path) -> OrderEngine {
    let store = RocksDBStore::open(path).unwrap();
    OrderEngine::new(
        Box::new(store.clone()),
        Box::new(store),
        Box::new(StubPaymentGateway::new()),
        EngineConfig::default(),
    )
}

#[tokio::test]
async fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: settle an order and leave a review.
    let order_id = {
        let engine = open_engine(&db_path);
        let order = common::submitted_order(&engine, dec!(75.00)).await;
        engine
            .complete(&Actor::buyer(BUYER), order.id)
            .await
            .unwrap();
        engine
            .leave_review(&Actor::buyer(BUYER), order.id, 4, None)
            .await
            .unwrap();
        order.id
    };

    // 2. Second run: everything is recovered from disk.
    let engine = open_engine(&db_path);
    let order = engine.order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert!(order.is_released);

    let profile = engine.seller_profile(SELLER).await.unwrap().unwrap();
    assert_eq!(profile.total_earnings, Balance::new(dec!(75.00)));
    assert_eq!(profile.review_count, 1);
    assert_eq!(profile.rating, dec!(4));

    // The recovered order still refuses a second payout or review.
    assert!(
        engine
            .complete(&Actor::buyer(BUYER), order_id)
            .await
            .is_err()
    );
    assert!(
        engine
            .leave_review(&Actor::buyer(BUYER), order_id, 5, None)
            .await
            .is_err()
    );
    assert!(!engine.notifications(SELLER).await.unwrap().is_empty());
}

#[test]
fn test_replay_then_sweep_cli() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cli_db");

    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "action, user, order, gig, amount, text, date, rating").unwrap();
    writeln!(script, "gig, 2, , 7, 100.00, Copy, ,").unwrap();
    writeln!(script, "order, 1, o1, 7, , , 2026-03-01,").unwrap();
    writeln!(script, "pay, 1, o1, , , , ,").unwrap();

    let output = Command::new(cargo_bin!("gigmarket"))
        .arg("replay")
        .arg(script.path())
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("o1,PAID,100,100"));

    Command::new(cargo_bin!("gigmarket"))
        .arg("sweep")
        .arg("--db-path")
        .arg(&db_path)
        .arg("--once")
        .arg("--date")
        .arg("2026-03-02")
        .assert()
        .success();
}
