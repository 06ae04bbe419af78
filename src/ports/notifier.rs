//! Notifier port - one-way delivery of billing events to users.

use async_trait::async_trait;

use crate::domain::billing::{BillingError, BillingEvent};

/// Sends a notification for a billing event.
///
/// Delivery failures are reported but never change billing state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &BillingEvent) -> Result<(), BillingError>;
}
