use super::order::{OrderId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat line between the two parties of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Time-ordered (v7) so storage keys sort by send time.
    pub id: Uuid,
    pub order: OrderId,
    pub sender: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn new(order: OrderId, sender: UserId, content: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            order,
            sender,
            content,
            sent_at: now,
        }
    }
}
