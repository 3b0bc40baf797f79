#![allow(dead_code)]

use gigmarket::application::engine::OrderEngine;
use gigmarket::config::EngineConfig;
use gigmarket::domain::actor::Actor;
use gigmarket::domain::delivery::DeliveryDraft;
use gigmarket::domain::order::{GigId, Order, UserId};
use gigmarket::infrastructure::gateway::StubPaymentGateway;
use gigmarket::infrastructure::in_memory::{InMemoryNotificationSink, InMemoryStore};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

pub const BUYER: UserId = UserId(1);
pub const SELLER: UserId = UserId(2);
pub const ARBITER: UserId = UserId(9);
pub const GIG: GigId = GigId(7);

pub const HEADER: [&str; 8] = [
    "action", "user", "order", "gig", "amount", "text", "date", "rating",
];

pub fn engine() -> Arc<OrderEngine> {
    Arc::new(OrderEngine::new(
        Box::new(InMemoryStore::new()),
        Box::new(InMemoryNotificationSink::new()),
        Box::new(StubPaymentGateway::new()),
        EngineConfig::default(),
    ))
}

pub fn draft(file: &str) -> DeliveryDraft {
    DeliveryDraft {
        file: file.to_string(),
        message: None,
        change_log: None,
    }
}

/// Publishes the shared gig and places a paid order on it.
pub async fn paid_order(
    engine: &OrderEngine,
    price: Decimal,
    deadline: Option<chrono::NaiveDate>,
) -> Order {
    engine
        .create_gig(&Actor::seller(SELLER), GIG, "Landing page copy", price)
        .await
        .unwrap();
    let order = engine
        .create_order(&Actor::buyer(BUYER), GIG, None, deadline)
        .await
        .unwrap();
    engine
        .confirm_payment(&Actor::buyer(BUYER), order.id, "pay_test")
        .await
        .unwrap()
}

/// Paid order with one delivery waiting for the buyer.
pub async fn submitted_order(engine: &OrderEngine, price: Decimal) -> Order {
    let order = paid_order(engine, price, None).await;
    let seller = Actor::seller(SELLER);
    engine.start_work(&seller, order.id).await.unwrap();
    engine
        .submit_delivery(&seller, order.id, draft("v1.pdf"))
        .await
        .unwrap()
}

/// Writes a script where every order runs the full paid-and-completed flow.
pub fn generate_script(path: &Path, orders: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(HEADER)?;
    wtr.write_record(["gig", "2", "", "7", "25.00", "Logo", "", ""])?;

    for i in 1..=orders {
        let label = format!("o{i}");
        let buyer = (100 + i % 50).to_string();
        wtr.write_record(["order", &buyer, &label, "7", "", "", "", ""])?;
        wtr.write_record(["pay", &buyer, &label, "", "", "", "", ""])?;
        wtr.write_record(["start", "2", &label, "", "", "", "", ""])?;
        wtr.write_record(["deliver", "2", &label, "", "", "logo.svg", "", ""])?;
        wtr.write_record(["complete", &buyer, &label, "", "", "", "", ""])?;
    }

    wtr.flush()?;
    Ok(())
}
