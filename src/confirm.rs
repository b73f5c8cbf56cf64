use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::Result;
use crate::types::PaymentIntent;

/// Receives verified payment intents and moves the money.
pub trait PaymentConfirmation: Send + Sync {
    fn submit(&self, intent: PaymentIntent) -> Result<PendingPayment>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayment {
    pub id: Uuid,
    #[serde(flatten)]
    pub intent: PaymentIntent,
    pub created_at: DateTime<Utc>,
}

/// Keeps pending payments in memory, newest first.
pub struct PendingPaymentLog {
    clock: Arc<dyn Clock>,
    entries: Mutex<Vec<PendingPayment>>,
}

impl PendingPaymentLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, entries: Mutex::new(Vec::new()) }
    }

    pub fn list(&self) -> Vec<PendingPayment> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl PaymentConfirmation for PendingPaymentLog {
    fn submit(&self, intent: PaymentIntent) -> Result<PendingPayment> {
        let pending = PendingPayment { id: Uuid::new_v4(), intent, created_at: self.clock.now() };
        info!(id = %pending.id, "pending payment created for {}", pending.intent.wallet_id);
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(0, pending.clone());
        Ok(pending)
    }
}
