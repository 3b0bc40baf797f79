use super::csv::command_reader::{Action, CommandRecord};
use super::csv::report_writer::{OrderRow, SellerRow};
use crate::application::engine::OrderEngine;
use crate::application::resolver::DisputeResolver;
use crate::application::sweeper::OverdueSweeper;
use crate::config::SweeperConfig;
use crate::domain::actor::Actor;
use crate::domain::delivery::DeliveryDraft;
use crate::domain::dispute::Resolution;
use crate::domain::order::{GigId, OrderId, UserId};
use crate::error::{MarketError, Result};
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Drives the engine from a command script.
///
/// Scripts name orders by label; the label is bound to the generated id when the `order` row is
/// replayed. The acting role follows from the action: arbiters refund and release, sellers
/// publish, start and deliver, buyers do the rest. A dated `sweep` row sets the script's day,
/// which later deadline extensions are checked against.
pub struct Replay {
    engine: Arc<OrderEngine>,
    resolver: DisputeResolver,
    sweeper: OverdueSweeper,
    labels: HashMap<String, OrderId>,
    placed: Vec<(String, OrderId)>,
    today: Option<NaiveDate>,
}

impl Replay {
    pub fn new(engine: Arc<OrderEngine>, sweeper: &SweeperConfig) -> Self {
        Self {
            resolver: DisputeResolver::new(engine.clone()),
            sweeper: OverdueSweeper::new(engine.clone(), sweeper.interval),
            engine,
            labels: HashMap::new(),
            placed: Vec::new(),
            today: None,
        }
    }

    pub async fn execute(&mut self, record: CommandRecord) -> Result<()> {
        debug!(action = %record.action, user = record.user, "Replaying command");
        let user = UserId(record.user);
        let buyer = Actor::buyer(user);
        let seller = Actor::seller(user);

        match record.action {
            Action::Gig => {
                let gig = GigId(required(record.gig, "gig")?);
                let price = required(record.amount, "amount")?;
                let title = required(record.text, "text")?;
                self.engine.create_gig(&seller, gig, &title, price).await?;
            }
            Action::Order => {
                let label = required(record.order, "order")?;
                if self.labels.contains_key(&label) {
                    return Err(MarketError::ValidationError(format!(
                        "order label {label} is already taken"
                    )));
                }
                let gig = GigId(required(record.gig, "gig")?);
                let order = self
                    .engine
                    .create_order(&buyer, gig, record.text, record.date)
                    .await?;
                self.labels.insert(label.clone(), order.id);
                self.placed.push((label, order.id));
            }
            Action::Pay => {
                let id = self.order_id(&record)?;
                let payment_ref = record
                    .text
                    .clone()
                    .unwrap_or_else(|| format!("pay_{}", id));
                self.engine.create_payment_intent(&buyer, id).await?;
                self.engine.confirm_payment(&buyer, id, &payment_ref).await?;
            }
            Action::Start => {
                let id = self.order_id(&record)?;
                self.engine.start_work(&seller, id).await?;
            }
            Action::Deliver => {
                let id = self.order_id(&record)?;
                let draft = DeliveryDraft {
                    file: required(record.text, "text")?,
                    message: None,
                    change_log: None,
                };
                self.engine.submit_delivery(&seller, id, draft).await?;
            }
            Action::Revise => {
                let id = self.order_id(&record)?;
                self.engine.request_revision(&buyer, id, record.text).await?;
            }
            Action::Complete => {
                let id = self.order_id(&record)?;
                self.engine.complete(&buyer, id).await?;
            }
            Action::Dispute => {
                let id = self.order_id(&record)?;
                let reason = required(record.text, "text")?;
                self.engine.raise_dispute(&buyer, id, &reason).await?;
            }
            Action::Refund | Action::Release => {
                let id = self.order_id(&record)?;
                let arbiter = Actor::arbiter(user);
                let resolution = if record.action == Action::Refund {
                    Resolution::Refund
                } else {
                    Resolution::Release
                };
                self.resolver
                    .resolve(&arbiter, id, resolution, record.text)
                    .await?;
            }
            Action::Extend => {
                let id = self.order_id(&record)?;
                let deadline = required(record.date, "date")?;
                let today = self.today();
                self.engine
                    .extend_deadline(&buyer, id, deadline, today)
                    .await?;
            }
            Action::Cancel => {
                let id = self.order_id(&record)?;
                self.engine.cancel(&buyer, id, record.text).await?;
            }
            Action::Review => {
                let id = self.order_id(&record)?;
                let stars = required(record.rating, "rating")?;
                self.engine
                    .leave_review(&buyer, id, stars, record.text)
                    .await?;
            }
            Action::Message => {
                let id = self.order_id(&record)?;
                let content = required(record.text, "text")?;
                let sender = match self.engine.order(id).await? {
                    Some(order) if order.seller == user => seller,
                    _ => buyer,
                };
                self.engine.post_message(&sender, id, &content).await?;
            }
            Action::Sweep => {
                if record.date.is_some() {
                    self.today = record.date;
                }
                let today = self.today();
                self.sweeper.sweep_once(today).await?;
            }
        }
        Ok(())
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn order_id(&self, record: &CommandRecord) -> Result<OrderId> {
        let label = record.order.as_deref().ok_or_else(|| {
            MarketError::ValidationError(format!("{} needs an order label", record.action))
        })?;
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| MarketError::not_found("order", label))
    }

    /// One row per replayed order, in the order they were placed.
    pub async fn order_rows(&self) -> Result<Vec<OrderRow>> {
        let mut rows = Vec::with_capacity(self.placed.len());
        for (label, id) in &self.placed {
            if let Some(order) = self.engine.order(*id).await? {
                rows.push(OrderRow::new(label.as_str(), &order));
            }
        }
        Ok(rows)
    }

    /// Sellers ranked by earnings.
    pub async fn seller_rows(&self) -> Result<Vec<SellerRow>> {
        let profiles = self.engine.leaderboard(usize::MAX).await?;
        Ok(profiles.iter().map(SellerRow::from).collect())
    }
}

fn required<T>(value: Option<T>, column: &str) -> Result<T> {
    value.ok_or_else(|| MarketError::ValidationError(format!("missing {column} column")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::order::OrderStatus;
    use crate::infrastructure::gateway::StubPaymentGateway;
    use crate::infrastructure::in_memory::{InMemoryNotificationSink, InMemoryStore};
    use crate::interfaces::csv::command_reader::CommandReader;
    use rust_decimal_macros::dec;

    fn replay() -> Replay {
        let engine = Arc::new(OrderEngine::new(
            Box::new(InMemoryStore::new()),
            Box::new(InMemoryNotificationSink::new()),
            Box::new(StubPaymentGateway::new()),
            EngineConfig::default(),
        ));
        Replay::new(engine, &SweeperConfig::default())
    }

    async fn run(replay: &mut Replay, script: &str) -> Vec<Result<()>> {
        let mut outcomes = Vec::new();
        for record in CommandReader::new(script.as_bytes()).commands() {
            outcomes.push(replay.execute(record.unwrap()).await);
        }
        outcomes
    }

    #[tokio::test]
    async fn test_replay_happy_path() {
        let mut replay = replay();
        let script = "action,user,order,gig,amount,text,date,rating\n\
                      gig,2,,7,50.00,Logo design,,\n\
                      order,1,o1,7,,,,\n\
                      pay,1,o1,,,,,\n\
                      start,2,o1,,,,,\n\
                      deliver,2,o1,,,logo.svg,,\n\
                      message,2,o1,,,Here you go,,\n\
                      complete,1,o1,,,,,\n\
                      review,1,o1,,,Great,,5";
        let outcomes = run(&mut replay, script).await;
        assert!(outcomes.iter().all(|o| o.is_ok()), "{outcomes:?}");

        let rows = replay.order_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].order, "o1");
        assert_eq!(rows[0].status, OrderStatus::Completed);
        assert!(rows[0].released);

        let sellers = replay.seller_rows().await.unwrap();
        assert_eq!(sellers[0].earnings, dec!(50));
        assert_eq!(sellers[0].rating, dec!(5));
    }

    #[tokio::test]
    async fn test_rejected_rows_do_not_stop_replay() {
        let mut replay = replay();
        let script = "action,user,order,gig,amount,text,date,rating\n\
                      gig,2,,7,50.00,Logo design,,\n\
                      order,1,o1,7,,,,\n\
                      start,2,o1,,,,,\n\
                      complete,1,missing,,,,,\n\
                      pay,1,o1,,,,,";
        let outcomes = run(&mut replay, script).await;

        assert!(outcomes[2].is_err());
        assert!(matches!(outcomes[3], Err(MarketError::NotFound { .. })));
        assert!(outcomes[4].is_ok());
        let rows = replay.order_rows().await.unwrap();
        assert_eq!(rows[0].status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_extend_uses_the_swept_day() {
        let mut replay = replay();
        let script = "action,user,order,gig,amount,text,date,rating\n\
                      gig,2,,7,100.00,Logo design,,\n\
                      order,1,o1,7,,,2026-03-01,\n\
                      pay,1,o1,,,,,\n\
                      start,2,o1,,,,,\n\
                      sweep,0,,,,,2026-03-02,\n\
                      extend,1,o1,,,,2026-03-09,\n\
                      extend,1,o1,,,,2026-03-01,";
        let outcomes = run(&mut replay, script).await;

        assert!(outcomes[..6].iter().all(|o| o.is_ok()), "{outcomes:?}");
        assert!(matches!(outcomes[6], Err(MarketError::ValidationError(_))));
        let rows = replay.order_rows().await.unwrap();
        assert_eq!(rows[0].status, OrderStatus::InProgress);
        assert!(!rows[0].overdue);
    }
}
