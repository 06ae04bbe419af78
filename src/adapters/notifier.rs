//! Notifier adapters.
//!
//! - `TracingNotifier` - writes each event to the log as structured JSON
//! - `RecordingNotifier` - keeps events in memory for assertions

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::billing::{BillingError, BillingEvent};
use crate::ports::Notifier;

/// Emits billing events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &BillingEvent) -> Result<(), BillingError> {
        let payload = serde_json::to_string(event).map_err(BillingError::storage)?;
        tracing::info!(
            event_type = event.event_type(),
            user_id = %event.user_id(),
            payload = %payload,
            "Billing notification"
        );
        Ok(())
    }
}

/// Collects events. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<BillingEvent>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&self) -> MutexGuard<'_, Vec<BillingEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<BillingEvent> {
        self.buffer().clone()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.buffer()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &BillingEvent) -> Result<(), BillingError> {
        self.buffer().push(event.clone());
        Ok(())
    }
}
