use crate::domain::money::Amount;
use crate::domain::order::OrderId;
use crate::domain::ports::{PaymentGateway, PaymentIntent};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

/// A deterministic, offline payment gateway.
///
/// Every payment reference settles unless it was declined explicitly or the gateway was switched
/// off. Used by the CLI and tests in place of a real provider.
#[derive(Clone, Default)]
pub struct StubPaymentGateway {
    next_intent: Arc<AtomicU64>,
    offline: Arc<AtomicBool>,
    declined: Arc<RwLock<HashSet<String>>>,
}

impl StubPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail as if the provider were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn decline(&self, payment_ref: impl Into<String>) {
        self.declined.write().await.insert(payment_ref.into());
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(MarketError::Gateway("payment provider unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentGateway for StubPaymentGateway {
    async fn create_intent(&self, amount: Amount, currency: &str) -> Result<PaymentIntent> {
        self.ensure_online()?;
        let n = self.next_intent.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentIntent {
            id: format!("intent_{n}"),
            amount,
            currency: currency.to_string(),
        })
    }

    async fn verify_payment(&self, order_id: OrderId, payment_ref: &str) -> Result<()> {
        self.ensure_online()?;
        if self.declined.read().await.contains(payment_ref) {
            return Err(MarketError::Gateway(format!(
                "payment {payment_ref} for order {order_id} was declined"
            )));
        }
        Ok(())
    }
}
