use super::order::{OrderId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an arbiter settles a disputed order's escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Escrow goes back to the buyer; the seller is not paid.
    Refund,
    /// Escrow is paid out to the seller.
    Release,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Refund => f.write_str("refund"),
            Resolution::Release => f.write_str("release"),
        }
    }
}

/// At most one per order. Terminal once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub order: OrderId,
    pub raised_by: UserId,
    pub reason: String,
    pub is_resolved: bool,
    pub resolution: Option<Resolution>,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn open(order: OrderId, raised_by: UserId, reason: String, now: DateTime<Utc>) -> Self {
        Self {
            order,
            raised_by,
            reason,
            is_resolved: false,
            resolution: None,
            resolution_note: None,
            created_at: now,
            resolved_at: None,
        }
    }

    pub(crate) fn resolve(
        &mut self,
        resolution: Resolution,
        note: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.is_resolved = true;
        self.resolution = Some(resolution);
        self.resolution_note = note;
        self.resolved_at = Some(now);
    }
}
