use super::engine::OrderEngine;
use crate::domain::actor::Actor;
use crate::domain::dispute::Resolution;
use crate::domain::lifecycle::Event;
use crate::domain::order::{Order, OrderId};
use crate::error::Result;
use std::sync::Arc;
use tracing::info;

/// Arbiter-facing settlement of disputed orders.
///
/// Both outcomes close the order as COMPLETED. Refund forfeits the escrow back to the buyer,
/// release pays it to the seller exactly once.
pub struct DisputeResolver {
    engine: Arc<OrderEngine>,
}

impl DisputeResolver {
    pub fn new(engine: Arc<OrderEngine>) -> Self {
        Self { engine }
    }

    pub async fn resolve(
        &self,
        arbiter: &Actor,
        order_id: OrderId,
        resolution: Resolution,
        note: Option<String>,
    ) -> Result<Order> {
        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let order = self
            .engine
            .apply(order_id, arbiter, Event::Resolve { resolution, note })
            .await?;
        info!(order = %order_id, arbiter = %arbiter.user, %resolution, "Dispute resolved");
        Ok(order)
    }

    pub async fn refund(&self, arbiter: &Actor, order_id: OrderId) -> Result<Order> {
        self.resolve(arbiter, order_id, Resolution::Refund, None)
            .await
    }

    pub async fn release(&self, arbiter: &Actor, order_id: OrderId) -> Result<Order> {
        self.resolve(arbiter, order_id, Resolution::Release, None)
            .await
    }
}
