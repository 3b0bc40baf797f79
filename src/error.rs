use crate::domain::order::{OrderId, OrderStatus};
use thiserror::Error;

/// Guard failures of a lifecycle transition.
///
/// A rejection never leaves a partial mutation behind: the transition is decided on a snapshot
/// and nothing is committed when a guard fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("cannot {event} an order in status {status}")]
    InvalidStatus {
        event: &'static str,
        status: OrderStatus,
    },
    #[error("revision limit of {max} reached")]
    RevisionLimitReached { max: u32 },
    #[error("a dispute already exists for this order")]
    DisputeExists,
    #[error("no open dispute for this order")]
    NoOpenDispute,
    #[error("dispute is already resolved")]
    DisputeResolved,
    #[error("order has already been reviewed")]
    ReviewExists,
    #[error("escrow has already been released")]
    AlreadyReleased,
    #[error("order is not past its deadline")]
    NotOverdue,
    #[error("gig is not accepting orders")]
    GigInactive,
}

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("not permitted: {0}")]
    NotPermitted(String),
    #[error("precondition failed: {0}")]
    Precondition(#[from] Rejection),
    #[error("write conflict on order {0}")]
    Conflict(OrderId),
    #[error("duplicate {entity} for order {order}")]
    Duplicate { entity: &'static str, order: OrderId },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("payment gateway error: {0}")]
    Gateway(String),
    #[error("notification error: {0}")]
    Notification(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),
    #[error("internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl MarketError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for failures a caller may retry by re-reading the order.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(e: serde_json::Error) -> Self {
        Self::InternalError(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
