use crate::config::EngineConfig;
use crate::domain::actor::{Actor, Role};
use crate::domain::delivery::{Delivery, DeliveryDraft};
use crate::domain::dispute::Dispute;
use crate::domain::lifecycle::{self, Event, Settlement};
use crate::domain::message::Message;
use crate::domain::money::Amount;
use crate::domain::notification::{Notice, Notification};
use crate::domain::order::{Gig, GigId, Order, OrderId, OrderStatus, UserId};
use crate::domain::ports::{
    NotificationSinkBox, OrderFilter, OrderSnapshot, OrderStoreBox, PaymentGatewayBox,
    PaymentIntent,
};
use crate::domain::review::{Rating, Review, SellerProfile};
use crate::error::{MarketError, Rejection, Result};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// The order lifecycle engine.
///
/// Every state change runs the same cycle: load a snapshot, let the lifecycle table decide, and
/// commit against the snapshot's version. A lost race re-reads and decides again, so the loser
/// of two concurrent requests sees the winner's state and is rejected by the table instead of
/// applying twice. Notifications go out only after the commit succeeded.
pub struct OrderEngine {
    store: OrderStoreBox,
    notifications: NotificationSinkBox,
    gateway: PaymentGatewayBox,
    config: EngineConfig,
}

impl OrderEngine {
    /// Creates a new `OrderEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `store` - Durable home of orders and their child records.
    /// * `notifications` - Where post-commit notices are delivered.
    /// * `gateway` - Payment provider used to create and verify payments.
    /// * `config` - Business parameters.
    pub fn new(
        store: OrderStoreBox,
        notifications: NotificationSinkBox,
        gateway: PaymentGatewayBox,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            notifications,
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Applies one lifecycle event to an order and returns the committed order.
    pub async fn apply(&self, order_id: OrderId, actor: &Actor, event: Event) -> Result<Order> {
        let policy = self.config.policy();
        let kind = event.kind();
        let mut attempt = 0;
        loop {
            let snapshot = self.snapshot(order_id).await?;
            let decision = lifecycle::decide(&snapshot, actor, &event, &policy, Utc::now())?;

            match self.store.commit(decision.commit).await {
                Ok(order) => {
                    info!(
                        order = %order.id,
                        event = %kind,
                        from = %snapshot.order.status,
                        to = %order.status,
                        "Order transitioned"
                    );
                    match decision.settlement {
                        Some(Settlement::Funded(amount)) => {
                            info!(order = %order.id, %amount, "Escrow funded")
                        }
                        Some(Settlement::Released(amount)) => {
                            info!(order = %order.id, seller = %order.seller, %amount, "Escrow released to seller")
                        }
                        Some(Settlement::Refunded(amount)) => {
                            info!(order = %order.id, buyer = %order.buyer, %amount, "Escrow refunded to buyer")
                        }
                        None => {}
                    }
                    self.dispatch(decision.notices).await;
                    return Ok(order);
                }
                Err(e) if e.is_conflict() && attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    debug!(order = %order_id, event = %kind, attempt, "Write conflict, re-reading order");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn snapshot(&self, order_id: OrderId) -> Result<OrderSnapshot> {
        self.store
            .load(order_id)
            .await?
            .ok_or_else(|| MarketError::not_found("order", order_id))
    }

    /// Best effort: a failed notification is logged and dropped, never surfaced.
    async fn dispatch(&self, notices: Vec<Notice>) {
        for notice in notices {
            let recipient = notice.recipient;
            let notification = Notification::from_notice(notice, Utc::now());
            if let Err(e) = self.notifications.notify(notification).await {
                warn!(%recipient, error = %e, "Notification dropped");
            }
        }
    }

    async fn order_for_party(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| MarketError::not_found("order", order_id))?;
        if !actor.is_party_to(&order) {
            return Err(MarketError::NotPermitted(format!(
                "{actor} is not a party to order {order_id}"
            )));
        }
        Ok(order)
    }

    /// Publishes a gig for the acting seller.
    pub async fn create_gig(
        &self,
        actor: &Actor,
        id: GigId,
        title: &str,
        price: Decimal,
    ) -> Result<Gig> {
        if actor.role != Role::Seller {
            return Err(MarketError::NotPermitted(format!(
                "{actor} may not publish gigs"
            )));
        }
        let title = title.trim();
        if title.is_empty() {
            return Err(MarketError::ValidationError(
                "Gig title must not be empty".to_string(),
            ));
        }
        if let Some(existing) = self.store.get_gig(id).await?
            && existing.seller != actor.user
        {
            return Err(MarketError::NotPermitted(format!(
                "gig {id} belongs to another seller"
            )));
        }
        let gig = Gig {
            id,
            seller: actor.user,
            title: title.to_string(),
            price: Amount::new(price)?,
            is_active: true,
        };
        self.store.put_gig(gig.clone()).await?;
        info!(gig = %gig.id, seller = %gig.seller, price = %gig.price, "Gig published");
        Ok(gig)
    }

    /// Stops a gig from taking new orders. Existing orders are unaffected.
    pub async fn deactivate_gig(&self, actor: &Actor, id: GigId) -> Result<Gig> {
        let mut gig = self
            .store
            .get_gig(id)
            .await?
            .ok_or_else(|| MarketError::not_found("gig", id))?;
        if actor.role != Role::Seller || gig.seller != actor.user {
            return Err(MarketError::NotPermitted(format!(
                "{actor} may not change gig {id}"
            )));
        }
        gig.is_active = false;
        self.store.put_gig(gig.clone()).await?;
        info!(gig = %gig.id, "Gig deactivated");
        Ok(gig)
    }

    /// Places a new PENDING order on a gig. The seller and price come from the gig.
    pub async fn create_order(
        &self,
        actor: &Actor,
        gig_id: GigId,
        requirements: Option<String>,
        deadline: Option<NaiveDate>,
    ) -> Result<Order> {
        if actor.role != Role::Buyer {
            return Err(MarketError::NotPermitted(format!(
                "{actor} may not place orders"
            )));
        }
        let gig = self
            .store
            .get_gig(gig_id)
            .await?
            .ok_or_else(|| MarketError::not_found("gig", gig_id))?;
        if !gig.is_active {
            return Err(Rejection::GigInactive.into());
        }
        if gig.seller == actor.user {
            return Err(MarketError::NotPermitted(
                "sellers may not order their own gig".to_string(),
            ));
        }

        let order = Order::new(
            actor.user,
            &gig,
            requirements,
            deadline,
            self.config.default_max_revisions,
            Utc::now(),
        );
        self.store.insert_order(order.clone()).await?;
        info!(order = %order.id, buyer = %order.buyer, seller = %order.seller, amount = %order.amount, "Order placed");

        self.dispatch(vec![Notice::about(
            order.seller,
            order.id,
            format!("You received a new order for '{}'", order.title),
        )])
        .await;
        Ok(order)
    }

    /// Asks the gateway for a payment intent covering a pending order.
    pub async fn create_payment_intent(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<PaymentIntent> {
        let order = self.order_for_party(actor, order_id).await?;
        if !actor.is_buyer_of(&order) {
            return Err(MarketError::NotPermitted(format!(
                "{actor} may not pay for order {order_id}"
            )));
        }
        if order.status != OrderStatus::Pending {
            return Err(Rejection::InvalidStatus {
                event: "pay for",
                status: order.status,
            }
            .into());
        }
        self.gateway
            .create_intent(order.amount, &self.config.currency)
            .await
    }

    /// Handles the gateway's settlement callback.
    ///
    /// Fails closed: escrow is funded only after the gateway verified the payment, and a
    /// gateway error leaves the order PENDING.
    pub async fn confirm_payment(
        &self,
        actor: &Actor,
        order_id: OrderId,
        payment_ref: &str,
    ) -> Result<Order> {
        let payment_ref = payment_ref.trim();
        if payment_ref.is_empty() {
            return Err(MarketError::ValidationError(
                "Payment reference must not be empty".to_string(),
            ));
        }
        let event = Event::ConfirmPayment {
            payment_ref: payment_ref.to_string(),
        };

        // Reject strangers and repeats before calling out to the gateway.
        let snapshot = self.snapshot(order_id).await?;
        lifecycle::decide(
            &snapshot,
            actor,
            &event,
            &self.config.policy(),
            Utc::now(),
        )?;

        if let Err(e) = self.gateway.verify_payment(order_id, payment_ref).await {
            warn!(order = %order_id, payment_ref, error = %e, "Payment not confirmed");
            return Err(e);
        }
        self.apply(order_id, actor, event).await
    }

    pub async fn start_work(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        self.apply(order_id, actor, Event::StartWork).await
    }

    pub async fn submit_delivery(
        &self,
        actor: &Actor,
        order_id: OrderId,
        draft: DeliveryDraft,
    ) -> Result<Order> {
        if draft.file.trim().is_empty() {
            return Err(MarketError::ValidationError(
                "A delivery needs a file".to_string(),
            ));
        }
        self.apply(order_id, actor, Event::SubmitDelivery(draft))
            .await
    }

    pub async fn request_revision(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<Order> {
        self.apply(order_id, actor, Event::RequestRevision { reason })
            .await
    }

    /// Accepts the delivery and pays the seller out of escrow.
    pub async fn complete(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        self.apply(order_id, actor, Event::Complete).await
    }

    pub async fn raise_dispute(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: &str,
    ) -> Result<Order> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(MarketError::ValidationError(
                "A dispute needs a reason".to_string(),
            ));
        }
        self.apply(
            order_id,
            actor,
            Event::RaiseDispute {
                reason: reason.to_string(),
            },
        )
        .await
    }

    /// Moves the deadline to `deadline`, which must not be before `today`.
    pub async fn extend_deadline(
        &self,
        actor: &Actor,
        order_id: OrderId,
        deadline: NaiveDate,
        today: NaiveDate,
    ) -> Result<Order> {
        self.apply(order_id, actor, Event::ExtendDeadline { deadline, today })
            .await
    }

    pub async fn cancel(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<Order> {
        self.apply(order_id, actor, Event::Cancel { reason }).await
    }

    /// Records the buyer's single review and refreshes the seller's rating.
    pub async fn leave_review(
        &self,
        actor: &Actor,
        order_id: OrderId,
        stars: u8,
        comment: Option<String>,
    ) -> Result<Order> {
        let rating = Rating::new(stars)?;
        self.apply(order_id, actor, Event::LeaveReview { rating, comment })
            .await
    }

    /// System transition used by the overdue sweep.
    pub async fn mark_overdue(&self, order_id: OrderId, today: NaiveDate) -> Result<Order> {
        self.apply(order_id, &Actor::system(), Event::MarkOverdue { today })
            .await
    }

    pub async fn post_message(
        &self,
        actor: &Actor,
        order_id: OrderId,
        content: &str,
    ) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MarketError::ValidationError(
                "Message must not be empty".to_string(),
            ));
        }
        self.order_for_party(actor, order_id).await?;
        let message = Message::new(order_id, actor.user, content.to_string(), Utc::now());
        self.store.append_message(message.clone()).await?;
        Ok(message)
    }

    pub async fn messages(&self, actor: &Actor, order_id: OrderId) -> Result<Vec<Message>> {
        self.order_for_party(actor, order_id).await?;
        self.store.messages(order_id).await
    }

    /// Every delivery of an order, newest first, for side-by-side comparison.
    pub async fn deliveries(&self, actor: &Actor, order_id: OrderId) -> Result<Vec<Delivery>> {
        self.order_for_party(actor, order_id).await?;
        self.store.deliveries(order_id).await
    }

    pub async fn order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.store.get_order(order_id).await
    }

    pub async fn dispute(&self, order_id: OrderId) -> Result<Option<Dispute>> {
        self.store.dispute(order_id).await
    }

    pub async fn review(&self, order_id: OrderId) -> Result<Option<Review>> {
        self.store.review(order_id).await
    }

    /// Orders matching `filter`, newest first.
    pub async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        self.store.query(filter).await
    }

    pub async fn orders_for_buyer(&self, buyer: UserId) -> Result<Vec<Order>> {
        self.orders(&OrderFilter {
            buyer: Some(buyer),
            ..OrderFilter::default()
        })
        .await
    }

    pub async fn orders_for_seller(&self, seller: UserId) -> Result<Vec<Order>> {
        self.orders(&OrderFilter {
            seller: Some(seller),
            ..OrderFilter::default()
        })
        .await
    }

    pub async fn notifications(&self, user: UserId) -> Result<Vec<Notification>> {
        self.notifications.inbox(user).await
    }

    pub async fn mark_notifications_read(&self, user: UserId) -> Result<usize> {
        self.notifications.mark_all_read(user).await
    }

    pub async fn seller_profile(&self, seller: UserId) -> Result<Option<SellerProfile>> {
        self.store.seller_profile(seller).await
    }

    /// Sellers ranked by total earnings.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<SellerProfile>> {
        let mut profiles = self.store.seller_profiles().await?;
        profiles.sort_by(|a, b| {
            b.total_earnings
                .partial_cmp(&a.total_earnings)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.seller.cmp(&b.seller))
        });
        profiles.truncate(limit);
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Balance;
    use crate::domain::ports::NotificationSink;
    use crate::infrastructure::gateway::StubPaymentGateway;
    use crate::infrastructure::in_memory::{InMemoryNotificationSink, InMemoryStore};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    const BUYER: UserId = UserId(1);
    const SELLER: UserId = UserId(2);

    fn engine_with(sink: NotificationSinkBox, gateway: StubPaymentGateway) -> OrderEngine {
        OrderEngine::new(
            Box::new(InMemoryStore::new()),
            sink,
            Box::new(gateway),
            EngineConfig::default(),
        )
    }

    async fn paid_order(engine: &OrderEngine) -> Order {
        engine
            .create_gig(&Actor::seller(SELLER), GigId(1), "Illustration", dec!(80.00))
            .await
            .unwrap();
        let order = engine
            .create_order(&Actor::buyer(BUYER), GigId(1), None, None)
            .await
            .unwrap();
        engine
            .confirm_payment(&Actor::buyer(BUYER), order.id, "pay_1")
            .await
            .unwrap()
    }

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn notify(&self, _notification: Notification) -> Result<()> {
            Err(MarketError::Notification("mail server down".to_string()))
        }

        async fn inbox(&self, _user: UserId) -> Result<Vec<Notification>> {
            Ok(Vec::new())
        }

        async fn mark_all_read(&self, _user: UserId) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_create_order_copies_gig_terms_and_notifies_seller() {
        let engine = engine_with(
            Box::new(InMemoryNotificationSink::new()),
            StubPaymentGateway::new(),
        );
        engine
            .create_gig(&Actor::seller(SELLER), GigId(1), "Illustration", dec!(80.00))
            .await
            .unwrap();
        let order = engine
            .create_order(&Actor::buyer(BUYER), GigId(1), Some("A fox".into()), None)
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.seller, SELLER);
        assert_eq!(order.amount.value(), dec!(80.00));
        assert!(order.escrow_amount.is_zero());

        let inbox = engine.notifications(SELLER).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].order, Some(order.id));
    }

    #[tokio::test]
    async fn test_seller_cannot_order_own_gig() {
        let engine = engine_with(
            Box::new(InMemoryNotificationSink::new()),
            StubPaymentGateway::new(),
        );
        engine
            .create_gig(&Actor::seller(SELLER), GigId(1), "Illustration", dec!(80.00))
            .await
            .unwrap();
        let as_buyer = Actor::buyer(SELLER);
        assert!(matches!(
            engine.create_order(&as_buyer, GigId(1), None, None).await,
            Err(MarketError::NotPermitted(_))
        ));
    }

    #[tokio::test]
    async fn test_inactive_gig_takes_no_orders() {
        let engine = engine_with(
            Box::new(InMemoryNotificationSink::new()),
            StubPaymentGateway::new(),
        );
        let seller = Actor::seller(SELLER);
        engine
            .create_gig(&seller, GigId(1), "Illustration", dec!(80.00))
            .await
            .unwrap();
        assert!(
            engine
                .deactivate_gig(&Actor::seller(UserId(3)), GigId(1))
                .await
                .is_err()
        );
        engine.deactivate_gig(&seller, GigId(1)).await.unwrap();

        assert!(matches!(
            engine
                .create_order(&Actor::buyer(BUYER), GigId(1), None, None)
                .await,
            Err(MarketError::Precondition(Rejection::GigInactive))
        ));
    }

    #[tokio::test]
    async fn test_gateway_failure_keeps_order_pending() {
        let gateway = StubPaymentGateway::new();
        let engine = engine_with(Box::new(InMemoryNotificationSink::new()), gateway.clone());
        engine
            .create_gig(&Actor::seller(SELLER), GigId(1), "Illustration", dec!(80.00))
            .await
            .unwrap();
        let order = engine
            .create_order(&Actor::buyer(BUYER), GigId(1), None, None)
            .await
            .unwrap();

        gateway.set_offline(true);
        let result = engine
            .confirm_payment(&Actor::buyer(BUYER), order.id, "pay_1")
            .await;
        assert!(matches!(result, Err(MarketError::Gateway(_))));

        let stored = engine.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert!(stored.escrow_amount.is_zero());
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_roll_back() {
        let engine = engine_with(Box::new(FailingSink), StubPaymentGateway::new());
        let order = paid_order(&engine).await;
        engine
            .start_work(&Actor::seller(SELLER), order.id)
            .await
            .unwrap();
        let delivered = engine
            .submit_delivery(
                &Actor::seller(SELLER),
                order.id,
                DeliveryDraft {
                    file: "fox.png".to_string(),
                    message: None,
                    change_log: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(delivered.status, OrderStatus::Submitted);
        let stored = engine.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Submitted);
    }

    #[tokio::test]
    async fn test_complete_twice_credits_once() {
        let engine = engine_with(
            Box::new(InMemoryNotificationSink::new()),
            StubPaymentGateway::new(),
        );
        let order = paid_order(&engine).await;
        let seller = Actor::seller(SELLER);
        let buyer = Actor::buyer(BUYER);
        engine.start_work(&seller, order.id).await.unwrap();
        engine
            .submit_delivery(
                &seller,
                order.id,
                DeliveryDraft {
                    file: "fox.png".to_string(),
                    message: None,
                    change_log: None,
                },
            )
            .await
            .unwrap();

        engine.complete(&buyer, order.id).await.unwrap();
        assert!(matches!(
            engine.complete(&buyer, order.id).await,
            Err(MarketError::Precondition(_))
        ));

        let profile = engine.seller_profile(SELLER).await.unwrap().unwrap();
        assert_eq!(profile.total_earnings, Balance::new(dec!(80.00)));
    }

    #[tokio::test]
    async fn test_messages_are_private_to_parties() {
        let engine = engine_with(
            Box::new(InMemoryNotificationSink::new()),
            StubPaymentGateway::new(),
        );
        let order = paid_order(&engine).await;

        engine
            .post_message(&Actor::buyer(BUYER), order.id, "Any progress?")
            .await
            .unwrap();
        engine
            .post_message(&Actor::seller(SELLER), order.id, "Sketch tomorrow")
            .await
            .unwrap();
        assert!(matches!(
            engine
                .post_message(&Actor::buyer(UserId(77)), order.id, "hi")
                .await,
            Err(MarketError::NotPermitted(_))
        ));
        assert!(matches!(
            engine.post_message(&Actor::buyer(BUYER), order.id, "  ").await,
            Err(MarketError::ValidationError(_))
        ));

        let thread = engine.messages(&Actor::seller(SELLER), order.id).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].content, "Any progress?");
        assert!(engine
            .messages(&Actor::buyer(UserId(77)), order.id)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_review_updates_seller_rating() {
        let engine = engine_with(
            Box::new(InMemoryNotificationSink::new()),
            StubPaymentGateway::new(),
        );
        let order = paid_order(&engine).await;
        let seller = Actor::seller(SELLER);
        let buyer = Actor::buyer(BUYER);
        engine.start_work(&seller, order.id).await.unwrap();
        engine
            .submit_delivery(
                &seller,
                order.id,
                DeliveryDraft {
                    file: "fox.png".to_string(),
                    message: None,
                    change_log: None,
                },
            )
            .await
            .unwrap();
        engine.complete(&buyer, order.id).await.unwrap();

        assert!(matches!(
            engine.leave_review(&buyer, order.id, 9, None).await,
            Err(MarketError::ValidationError(_))
        ));
        engine
            .leave_review(&buyer, order.id, 4, Some("Lovely".into()))
            .await
            .unwrap();
        assert!(matches!(
            engine.leave_review(&buyer, order.id, 5, None).await,
            Err(MarketError::Precondition(Rejection::ReviewExists))
        ));

        let review = engine.review(order.id).await.unwrap().unwrap();
        assert_eq!(review.rating.stars(), 4);
        assert_eq!(review.comment.as_deref(), Some("Lovely"));

        let profile = engine.seller_profile(SELLER).await.unwrap().unwrap();
        assert_eq!(profile.rating, dec!(4));
        assert_eq!(profile.review_count, 1);
    }
}
