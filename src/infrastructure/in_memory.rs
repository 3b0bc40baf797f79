use crate::domain::delivery::Delivery;
use crate::domain::dispute::Dispute;
use crate::domain::message::Message;
use crate::domain::notification::Notification;
use crate::domain::order::{Gig, GigId, Order, OrderId, UserId};
use crate::domain::ports::{
    DisputeWrite, NotificationSink, OrderCommit, OrderFilter, OrderSnapshot, OrderStore,
};
use crate::domain::review::{Rating, Review, SellerProfile};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Everything stored under one order id. Guarded by its own mutex so commits on different
/// orders never wait for each other.
#[derive(Debug)]
struct OrderRecord {
    order: Order,
    deliveries: Vec<Delivery>,
    dispute: Option<Dispute>,
    review: Option<Review>,
    messages: Vec<Message>,
}

impl OrderRecord {
    fn new(order: Order) -> Self {
        Self {
            order,
            deliveries: Vec::new(),
            dispute: None,
            review: None,
            messages: Vec::new(),
        }
    }

    fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            order: self.order.clone(),
            dispute: self.dispute.clone(),
            latest_delivery: self.deliveries.iter().map(|d| d.version).max(),
            has_review: self.review.is_some(),
        }
    }
}

/// Earnings and the review log a seller's rating is derived from.
#[derive(Debug)]
struct SellerLedger {
    profile: SellerProfile,
    ratings: Vec<Rating>,
}

/// A thread-safe in-memory order store.
///
/// The order and seller maps are only write-locked to insert new entries; commits lock the
/// single order they touch, then that order's seller ledger. That lock order is the same
/// everywhere.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    gigs: Arc<RwLock<HashMap<GigId, Gig>>>,
    orders: Arc<RwLock<HashMap<OrderId, Arc<Mutex<OrderRecord>>>>>,
    sellers: Arc<RwLock<HashMap<UserId, Arc<Mutex<SellerLedger>>>>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, order_id: OrderId) -> Option<Arc<Mutex<OrderRecord>>> {
        self.orders.read().await.get(&order_id).cloned()
    }

    async fn ledger(&self, seller: UserId) -> Arc<Mutex<SellerLedger>> {
        if let Some(ledger) = self.sellers.read().await.get(&seller) {
            return ledger.clone();
        }
        self.sellers
            .write()
            .await
            .entry(seller)
            .or_insert_with(|| {
                Arc::new(Mutex::new(SellerLedger {
                    profile: SellerProfile::new(seller),
                    ratings: Vec::new(),
                }))
            })
            .clone()
    }

    async fn ledgers(&self) -> Vec<Arc<Mutex<SellerLedger>>> {
        self.sellers.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn put_gig(&self, gig: Gig) -> Result<()> {
        self.gigs.write().await.insert(gig.id, gig);
        Ok(())
    }

    async fn get_gig(&self, gig_id: GigId) -> Result<Option<Gig>> {
        Ok(self.gigs.read().await.get(&gig_id).cloned())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(MarketError::Duplicate {
                entity: "order",
                order: order.id,
            });
        }
        orders.insert(order.id, Arc::new(Mutex::new(OrderRecord::new(order))));
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        match self.record(order_id).await {
            Some(record) => Ok(Some(record.lock().await.order.clone())),
            None => Ok(None),
        }
    }

    async fn load(&self, order_id: OrderId) -> Result<Option<OrderSnapshot>> {
        match self.record(order_id).await {
            Some(record) => Ok(Some(record.lock().await.snapshot())),
            None => Ok(None),
        }
    }

    async fn commit(&self, commit: OrderCommit) -> Result<Order> {
        let order_id = commit.order.id;
        let record = self
            .record(order_id)
            .await
            .ok_or_else(|| MarketError::not_found("order", order_id))?;
        let mut record = record.lock().await;

        if record.order.version != commit.expected_version {
            return Err(MarketError::Conflict(order_id));
        }

        // Uniqueness checks first so a rejected commit writes nothing.
        if let Some(delivery) = &commit.delivery
            && record.deliveries.iter().any(|d| d.version == delivery.version)
        {
            return Err(MarketError::Duplicate {
                entity: "delivery",
                order: order_id,
            });
        }
        match (&commit.dispute, &record.dispute) {
            (Some(DisputeWrite::Open(_)), Some(_)) => {
                return Err(MarketError::Duplicate {
                    entity: "dispute",
                    order: order_id,
                });
            }
            (Some(DisputeWrite::Resolve(_)), None) => {
                return Err(MarketError::not_found("dispute", order_id));
            }
            (Some(DisputeWrite::Resolve(_)), Some(stored)) if stored.is_resolved => {
                return Err(MarketError::Duplicate {
                    entity: "dispute resolution",
                    order: order_id,
                });
            }
            _ => {}
        }
        if commit.review.is_some() && record.review.is_some() {
            return Err(MarketError::Duplicate {
                entity: "review",
                order: order_id,
            });
        }

        if commit.credit.is_some() || commit.review.is_some() {
            let ledger = self.ledger(commit.order.seller).await;
            let mut guard = ledger.lock().await;
            let ledger = &mut *guard;
            if let Some(credit) = &commit.credit {
                ledger.profile.credit(credit.amount);
            }
            if let Some(review) = &commit.review {
                ledger.ratings.push(review.rating);
                ledger.profile.recompute_rating(&ledger.ratings);
            }
        }

        let mut order = commit.order;
        order.version = commit.expected_version + 1;
        if let Some(delivery) = commit.delivery {
            record.deliveries.push(delivery);
        }
        match commit.dispute {
            Some(DisputeWrite::Open(dispute)) | Some(DisputeWrite::Resolve(dispute)) => {
                record.dispute = Some(dispute);
            }
            None => {}
        }
        if let Some(review) = commit.review {
            record.review = Some(review);
        }
        record.order = order.clone();
        Ok(order)
    }

    async fn query(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let records: Vec<_> = self.orders.read().await.values().cloned().collect();
        let mut matched = Vec::new();
        for record in records {
            let record = record.lock().await;
            if filter.matches(&record.order) {
                matched.push(record.order.clone());
            }
        }
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn deliveries(&self, order_id: OrderId) -> Result<Vec<Delivery>> {
        let Some(record) = self.record(order_id).await else {
            return Ok(Vec::new());
        };
        let mut deliveries = record.lock().await.deliveries.clone();
        deliveries.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(deliveries)
    }

    async fn dispute(&self, order_id: OrderId) -> Result<Option<Dispute>> {
        match self.record(order_id).await {
            Some(record) => Ok(record.lock().await.dispute.clone()),
            None => Ok(None),
        }
    }

    async fn review(&self, order_id: OrderId) -> Result<Option<Review>> {
        match self.record(order_id).await {
            Some(record) => Ok(record.lock().await.review.clone()),
            None => Ok(None),
        }
    }

    async fn append_message(&self, message: Message) -> Result<()> {
        let record = self
            .record(message.order)
            .await
            .ok_or_else(|| MarketError::not_found("order", message.order))?;
        record.lock().await.messages.push(message);
        Ok(())
    }

    async fn messages(&self, order_id: OrderId) -> Result<Vec<Message>> {
        match self.record(order_id).await {
            Some(record) => Ok(record.lock().await.messages.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn seller_profile(&self, seller: UserId) -> Result<Option<SellerProfile>> {
        let ledger = self.sellers.read().await.get(&seller).cloned();
        match ledger {
            Some(ledger) => Ok(Some(ledger.lock().await.profile.clone())),
            None => Ok(None),
        }
    }

    async fn seller_profiles(&self) -> Result<Vec<SellerProfile>> {
        let mut profiles = Vec::new();
        for ledger in self.ledgers().await {
            profiles.push(ledger.lock().await.profile.clone());
        }
        Ok(profiles)
    }
}

/// In-memory notification inbox per user.
#[derive(Default, Clone)]
pub struct InMemoryNotificationSink {
    notifications: Arc<RwLock<HashMap<UserId, Vec<Notification>>>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        notifications
            .entry(notification.recipient)
            .or_default()
            .push(notification);
        Ok(())
    }

    async fn inbox(&self, user: UserId) -> Result<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        let mut inbox = notifications.get(&user).cloned().unwrap_or_default();
        inbox.reverse();
        Ok(inbox)
    }

    async fn mark_all_read(&self, user: UserId) -> Result<usize> {
        let mut notifications = self.notifications.write().await;
        let mut changed = 0;
        for notification in notifications.get_mut(&user).into_iter().flatten() {
            if !notification.is_read {
                notification.is_read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::{Amount, Balance};
    use crate::domain::notification::Notice;
    use crate::domain::ports::EarningsCredit;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn order() -> Order {
        order_for(UserId(2))
    }

    fn order_for(seller: UserId) -> Order {
        let gig = Gig {
            id: GigId(1),
            seller,
            title: "Translation".to_string(),
            price: Amount::new(dec!(40.00)).unwrap(),
            is_active: true,
        };
        Order::new(UserId(1), &gig, None, None, 3, Utc::now())
    }

    #[tokio::test]
    async fn test_insert_and_load_order() {
        let store = InMemoryStore::new();
        let order = order();
        store.insert_order(order.clone()).await.unwrap();

        let snapshot = store.load(order.id).await.unwrap().unwrap();
        assert_eq!(snapshot.order, order);
        assert_eq!(snapshot.latest_delivery, None);
        assert!(!snapshot.has_review);

        assert!(matches!(
            store.insert_order(order).await,
            Err(MarketError::Duplicate { .. })
        ));
        assert!(store.load(OrderId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_bumps_version_and_rejects_stale_writer() {
        let store = InMemoryStore::new();
        let order = order();
        store.insert_order(order.clone()).await.unwrap();

        let committed = store
            .commit(OrderCommit::new(0, order.clone()))
            .await
            .unwrap();
        assert_eq!(committed.version, 1);

        let stale = store.commit(OrderCommit::new(0, order.clone())).await;
        assert!(matches!(stale, Err(MarketError::Conflict(id)) if id == order.id));
    }

    #[tokio::test]
    async fn test_commit_credits_seller_ledger() {
        let store = InMemoryStore::new();
        let order = order();
        store.insert_order(order.clone()).await.unwrap();

        let mut commit = OrderCommit::new(0, order.clone());
        commit.credit = Some(EarningsCredit {
            seller: UserId(2),
            amount: Balance::new(dec!(40.00)),
        });
        store.commit(commit).await.unwrap();

        let profile = store.seller_profile(UserId(2)).await.unwrap().unwrap();
        assert_eq!(profile.total_earnings, Balance::new(dec!(40.00)));
    }

    #[tokio::test]
    async fn test_held_seller_ledger_does_not_block_other_sellers() {
        let store = InMemoryStore::new();
        let busy = order_for(UserId(2));
        let other = order_for(UserId(3));
        store.insert_order(busy.clone()).await.unwrap();
        store.insert_order(other.clone()).await.unwrap();

        let held = store.ledger(UserId(2)).await;
        let _guard = held.lock().await;

        let mut commit = OrderCommit::new(0, other.clone());
        commit.credit = Some(EarningsCredit {
            seller: UserId(3),
            amount: Balance::new(dec!(40.00)),
        });
        tokio::time::timeout(Duration::from_secs(1), store.commit(commit))
            .await
            .expect("commit for another seller waited on a held ledger")
            .unwrap();

        let mut blocked = OrderCommit::new(0, busy.clone());
        blocked.credit = Some(EarningsCredit {
            seller: UserId(2),
            amount: Balance::new(dec!(40.00)),
        });
        let waited =
            tokio::time::timeout(Duration::from_millis(50), store.commit(blocked)).await;
        assert!(waited.is_err());

        let profile = store.seller_profile(UserId(3)).await.unwrap().unwrap();
        assert_eq!(profile.total_earnings, Balance::new(dec!(40.00)));
    }

    #[tokio::test]
    async fn test_second_review_is_rejected_by_store() {
        let store = InMemoryStore::new();
        let order = order();
        store.insert_order(order.clone()).await.unwrap();

        let review = Review {
            order: order.id,
            seller: UserId(2),
            buyer: UserId(1),
            rating: Rating::new(5).unwrap(),
            comment: None,
            created_at: Utc::now(),
        };
        let mut first = OrderCommit::new(0, order.clone());
        first.review = Some(review.clone());
        store.commit(first).await.unwrap();

        let mut second = OrderCommit::new(1, order.clone());
        second.review = Some(review);
        assert!(matches!(
            store.commit(second).await,
            Err(MarketError::Duplicate {
                entity: "review",
                ..
            })
        ));
        let profile = store.seller_profile(UserId(2)).await.unwrap().unwrap();
        assert_eq!(profile.review_count, 1);
    }

    #[tokio::test]
    async fn test_notification_inbox_and_read_marking() {
        let sink = InMemoryNotificationSink::new();
        let order_id = OrderId::new();
        for text in ["first", "second"] {
            let notice = Notice::about(UserId(1), order_id, text);
            sink.notify(Notification::from_notice(notice, Utc::now()))
                .await
                .unwrap();
        }

        let inbox = sink.inbox(UserId(1)).await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].message, "second");

        assert_eq!(sink.mark_all_read(UserId(1)).await.unwrap(), 2);
        assert_eq!(sink.mark_all_read(UserId(1)).await.unwrap(), 0);
        assert!(sink.inbox(UserId(2)).await.unwrap().is_empty());
    }
}
