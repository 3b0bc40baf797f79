use super::money::{Amount, Balance};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque order identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved platform user; authentication happens before the engine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GigId(pub u64);

impl fmt::Display for GigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A seller's listing. Orders copy its seller, title and price at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gig {
    pub id: GigId,
    pub seller: UserId,
    pub title: String,
    pub price: Amount,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    InProgress,
    Submitted,
    Revision,
    Disputed,
    Overdue,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Statuses the overdue sweep considers.
    pub const ACTIVE: [OrderStatus; 4] = [
        OrderStatus::Paid,
        OrderStatus::InProgress,
        OrderStatus::Revision,
        OrderStatus::Submitted,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Revision => "REVISION",
            OrderStatus::Disputed => "DISPUTED",
            OrderStatus::Overdue => "OVERDUE",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The aggregate root of the marketplace.
///
/// Fields are public for reads and for the store; mutation goes through the lifecycle table in
/// [`crate::domain::lifecycle`], which is the only code that changes `status` or moves escrow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer: UserId,
    pub seller: UserId,
    pub gig: GigId,
    pub title: String,
    pub amount: Amount,
    pub requirements: Option<String>,
    pub deadline: Option<NaiveDate>,
    /// Funds held on behalf of the buyer. Zero until payment and after settlement.
    pub escrow_amount: Balance,
    pub is_released: bool,
    pub payment_ref: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub revision_count: u32,
    pub max_revisions: u32,
    pub revision_reason: Option<String>,
    pub is_overdue: bool,
    pub penalty_amount: Balance,
    /// Written only by automated transitions.
    pub system_note: Option<String>,
    /// Store-managed optimistic concurrency token.
    pub version: u64,
}

impl Order {
    pub fn new(
        buyer: UserId,
        gig: &Gig,
        requirements: Option<String>,
        deadline: Option<NaiveDate>,
        max_revisions: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            buyer,
            seller: gig.seller,
            gig: gig.id,
            title: gig.title.clone(),
            amount: gig.price,
            requirements,
            deadline,
            escrow_amount: Balance::ZERO,
            is_released: false,
            payment_ref: None,
            status: OrderStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            revision_count: 0,
            max_revisions,
            revision_reason: None,
            is_overdue: false,
            penalty_amount: Balance::ZERO,
            system_note: None,
            version: 0,
        }
    }

    pub fn is_past_deadline(&self, today: NaiveDate) -> bool {
        self.deadline.is_some_and(|deadline| deadline < today)
    }

    pub fn can_request_revision(&self) -> bool {
        self.revision_count < self.max_revisions
    }

    pub(crate) fn fund_escrow(&mut self) {
        self.escrow_amount = self.amount.into();
    }

    /// Moves the held escrow out for payout. Returns `None` once released, so a second call can
    /// never produce a second credit.
    pub(crate) fn release_escrow(&mut self) -> Option<Balance> {
        if self.is_released {
            return None;
        }
        self.is_released = true;
        Some(self.escrow_amount.take())
    }

    /// Drops the held escrow without payout (refund to the buyer).
    pub(crate) fn forfeit_escrow(&mut self) -> Balance {
        self.escrow_amount.take()
    }

    pub(crate) fn apply_penalty(&mut self, rate: Decimal) {
        self.penalty_amount = self.amount.percentage(rate);
        self.is_overdue = true;
    }
}
