use super::delivery::Delivery;
use super::dispute::Dispute;
use super::message::Message;
use super::money::{Amount, Balance};
use super::notification::Notification;
use super::order::{Gig, GigId, Order, OrderId, OrderStatus, UserId};
use super::review::{Review, SellerProfile};
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Everything the lifecycle table needs to decide a transition, read in one go.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub order: Order,
    pub dispute: Option<Dispute>,
    pub latest_delivery: Option<u32>,
    pub has_review: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisputeWrite {
    /// Insert; the store rejects it if the order already has a dispute.
    Open(Dispute),
    /// Overwrite; the store rejects it if the stored dispute is already resolved.
    Resolve(Dispute),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarningsCredit {
    pub seller: UserId,
    pub amount: Balance,
}

/// One atomic unit of work against a single order.
///
/// Applied only if the stored order is still at `expected_version`; otherwise the store answers
/// `MarketError::Conflict` and writes nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCommit {
    pub expected_version: u64,
    pub order: Order,
    pub delivery: Option<Delivery>,
    pub dispute: Option<DisputeWrite>,
    pub review: Option<Review>,
    pub credit: Option<EarningsCredit>,
}

impl OrderCommit {
    pub fn new(expected_version: u64, order: Order) -> Self {
        Self {
            expected_version,
            order,
            delivery: None,
            dispute: None,
            review: None,
            credit: None,
        }
    }
}

/// Predicate for [`OrderStore::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub statuses: Option<Vec<OrderStatus>>,
    pub buyer: Option<UserId>,
    pub seller: Option<UserId>,
    pub deadline_before: Option<NaiveDate>,
    pub is_overdue: Option<bool>,
}

impl OrderFilter {
    /// Active orders whose deadline passed before `today` and that were not swept yet.
    pub fn overdue_candidates(today: NaiveDate) -> Self {
        Self {
            statuses: Some(OrderStatus::ACTIVE.to_vec()),
            deadline_before: Some(today),
            is_overdue: Some(false),
            ..Self::default()
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.statuses
            .as_ref()
            .is_none_or(|statuses| statuses.contains(&order.status))
            && self.buyer.is_none_or(|buyer| order.buyer == buyer)
            && self.seller.is_none_or(|seller| order.seller == seller)
            && self
                .deadline_before
                .is_none_or(|today| order.is_past_deadline(today))
            && self.is_overdue.is_none_or(|flag| order.is_overdue == flag)
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn put_gig(&self, gig: Gig) -> Result<()>;
    async fn get_gig(&self, gig_id: GigId) -> Result<Option<Gig>>;
    /// Inserts a fresh order; rejects an id that already exists.
    async fn insert_order(&self, order: Order) -> Result<()>;
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;
    async fn load(&self, order_id: OrderId) -> Result<Option<OrderSnapshot>>;
    /// Atomic read-check-write. Returns the order as stored, with its new version.
    async fn commit(&self, commit: OrderCommit) -> Result<Order>;
    async fn query(&self, filter: &OrderFilter) -> Result<Vec<Order>>;
    /// Deliveries of an order, newest version first.
    async fn deliveries(&self, order_id: OrderId) -> Result<Vec<Delivery>>;
    async fn dispute(&self, order_id: OrderId) -> Result<Option<Dispute>>;
    async fn review(&self, order_id: OrderId) -> Result<Option<Review>>;
    async fn append_message(&self, message: Message) -> Result<()>;
    /// Messages of an order, oldest first.
    async fn messages(&self, order_id: OrderId) -> Result<Vec<Message>>;
    async fn seller_profile(&self, seller: UserId) -> Result<Option<SellerProfile>>;
    async fn seller_profiles(&self) -> Result<Vec<SellerProfile>>;
}

/// Best-effort delivery of notifications; callers never roll back on failure.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
    /// A user's notifications, newest first.
    async fn inbox(&self, user: UserId) -> Result<Vec<Notification>>;
    /// Marks every unread notification of `user` as read and returns how many changed.
    async fn mark_all_read(&self, user: UserId) -> Result<usize>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: Amount,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, amount: Amount, currency: &str) -> Result<PaymentIntent>;
    /// Confirms that `payment_ref` settled for `order_id`. Any error means "not paid".
    async fn verify_payment(&self, order_id: OrderId, payment_ref: &str) -> Result<()>;
}

pub type OrderStoreBox = Box<dyn OrderStore>;
pub type NotificationSinkBox = Box<dyn NotificationSink>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;
