use super::order::{OrderId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A notice produced by a committed transition, before it is handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub recipient: UserId,
    pub message: String,
    pub order: Option<OrderId>,
}

impl Notice {
    pub fn about(recipient: UserId, order: OrderId, message: impl Into<String>) -> Self {
        Self {
            recipient,
            message: message.into(),
            order: Some(order),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: UserId,
    pub message: String,
    /// Lookup only; the notification does not own the order.
    pub order: Option<OrderId>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_notice(notice: Notice, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            recipient: notice.recipient,
            message: notice.message,
            order: notice.order,
            is_read: false,
            created_at: now,
        }
    }
}
