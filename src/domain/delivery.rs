use super::order::OrderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a seller hands in; the engine assigns the version and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryDraft {
    pub file: String,
    pub message: Option<String>,
    pub change_log: Option<String>,
}

/// One immutable submission. Versions start at 1 and increase strictly per order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub order: OrderId,
    pub version: u32,
    pub file: String,
    pub message: Option<String>,
    pub change_log: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Delivery {
    pub fn from_draft(
        order: OrderId,
        latest_version: Option<u32>,
        draft: DeliveryDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order,
            version: latest_version.map_or(1, |v| v + 1),
            file: draft.file,
            message: draft.message,
            change_log: draft.change_log,
            submitted_at: now,
        }
    }
}
