//! Mock gateway client.
//!
//! Approves everything by default, for environments without gateway
//! credentials. Tests can script outcomes and inspect the call log:
//! - Scripted charge outcomes (decline, invalid key, timeout, bad signature)
//! - Artificial latency
//! - Call tracking

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::billing::{
    BillingError, BillingToken, CardMeta, GatewayError, GatewayErrorKind, OrderReference,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    ChargeReceipt, ChargeRequest, GatewayClient, IssuanceForm, IssuedKey, KeyIssuanceRequest,
    OrderStatus,
};

use super::signing::{ensure_recurring_capable, sha256_hex};

const MOCK_MERCHANT_ID: &str = "MOCKMID";
const MOCK_SIGN_KEY: &str = "mock-sign-key";

/// Scripted result of a mock charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Approve,
    Decline { code: String, message: String },
    InvalidKey,
    Timeout,
    BadSignature,
}

impl MockOutcome {
    pub fn decline(code: impl Into<String>, message: impl Into<String>) -> Self {
        MockOutcome::Decline {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Recorded method call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub method: &'static str,
    pub order_ref: String,
    pub amount: Option<i64>,
}

/// Mock gateway client. Clones share state.
#[derive(Clone, Default)]
pub struct MockGatewayClient {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Outcomes consumed by the next charges, in order.
    script: VecDeque<MockOutcome>,

    /// Outcome once the script is exhausted.
    fallback: Option<MockOutcome>,

    /// Token handed out by the next issuance.
    next_token: Option<String>,

    /// Card number handed out with issued keys.
    card_number: Option<String>,

    /// Error returned by the next issuance.
    issuance_error: Option<BillingError>,

    /// Latency added to every network call.
    delay: Option<Duration>,

    /// Gateway-side view of orders, by order reference.
    orders: HashMap<String, OrderStatus>,

    call_log: Vec<GatewayCall>,

    sequence: u64,
}

impl MockGatewayClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Queue an outcome for the next charge.
    pub fn push_outcome(&self, outcome: MockOutcome) {
        self.state().script.push_back(outcome);
    }

    /// Outcome for every charge once queued outcomes run out.
    pub fn set_fallback(&self, outcome: MockOutcome) {
        self.state().fallback = Some(outcome);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Token and card number returned by the next issuance.
    pub fn set_issued_key(&self, token: impl Into<String>, card_number: impl Into<String>) {
        let mut state = self.state();
        state.next_token = Some(token.into());
        state.card_number = Some(card_number.into());
    }

    pub fn fail_next_issuance(&self, error: BillingError) {
        self.state().issuance_error = Some(error);
    }

    /// Record what the gateway knows about an order, for inquiry tests.
    pub fn set_order_status(&self, order_ref: &OrderReference, status: OrderStatus) {
        self.state().orders.insert(order_ref.to_string(), status);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Assertion Helpers
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().call_log.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    pub fn clear_calls(&self) {
        self.state().call_log.clear();
    }

    fn record(&self, method: &'static str, order_ref: &OrderReference, amount: Option<i64>) {
        self.state().call_log.push(GatewayCall {
            method,
            order_ref: order_ref.to_string(),
            amount,
        });
    }

    async fn pause(&self) {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl GatewayClient for MockGatewayClient {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn prepare_issuance(
        &self,
        order_ref: &OrderReference,
        requested_at: Timestamp,
    ) -> Result<IssuanceForm, BillingError> {
        let oid = order_ref.to_string();
        let timestamp = requested_at.epoch_millis().to_string();
        Ok(IssuanceForm {
            mid: MOCK_MERCHANT_ID.to_string(),
            signature: sha256_hex(&format!("oid={}&price=0&timestamp={}", oid, timestamp)),
            verification: sha256_hex(&format!(
                "oid={}&price=0&signKey={}&timestamp={}",
                oid, MOCK_SIGN_KEY, timestamp
            )),
            m_key: sha256_hex(MOCK_SIGN_KEY),
            oid,
            price: 0,
            timestamp,
        })
    }

    async fn issue_key(&self, request: KeyIssuanceRequest) -> Result<IssuedKey, BillingError> {
        self.record("issue_key", &request.order_ref, None);
        self.pause().await;

        let (error, token, card_number) = {
            let mut state = self.state();
            state.sequence += 1;
            let token = state
                .next_token
                .take()
                .unwrap_or_else(|| format!("BILLMOCK{:08}", state.sequence));
            (state.issuance_error.take(), token, state.card_number.clone())
        };
        if let Some(error) = error {
            return Err(error);
        }

        tracing::debug!(order_ref = %request.order_ref, "Mock gateway issued billing key");
        Ok(IssuedKey {
            token: BillingToken::new(token)?,
            card: CardMeta::new(
                Some(card_number.as_deref().unwrap_or("4111111111111111")),
                Some("MOCK CARD"),
            ),
            transaction_id: None,
            raw_body: r#"{"resultCode":"0000","resultMsg":"mock"}"#.to_string(),
        })
    }

    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, BillingError> {
        ensure_recurring_capable(&request.token)?;
        self.record("charge", &request.order_ref, Some(request.amount));
        self.pause().await;

        let (outcome, sequence) = {
            let mut state = self.state();
            state.sequence += 1;
            let outcome = state
                .script
                .pop_front()
                .or_else(|| state.fallback.clone())
                .unwrap_or(MockOutcome::Approve);
            (outcome, state.sequence)
        };
        let order_key = request.order_ref.to_string();

        match outcome {
            MockOutcome::Approve => {
                let transaction_id = format!("MOCKTID{:010}", sequence);
                self.state().orders.insert(
                    order_key.clone(),
                    OrderStatus::Paid {
                        transaction_id: transaction_id.clone(),
                    },
                );
                tracing::debug!(order_ref = %order_key, amount = request.amount, "Mock gateway approved charge");
                Ok(ChargeReceipt {
                    transaction_id: transaction_id.clone(),
                    result_code: "00".to_string(),
                    result_message: "mock approval".to_string(),
                    raw_body: format!(
                        r#"{{"resultCode":"00","tid":"{}","moid":"{}","price":"{}"}}"#,
                        transaction_id, order_key, request.amount
                    ),
                })
            }
            MockOutcome::Decline { code, message } => {
                self.state().orders.insert(
                    order_key,
                    OrderStatus::NotPaid {
                        code: code.clone(),
                        message: message.clone(),
                    },
                );
                Err(GatewayError::declined(code, message, None).into())
            }
            MockOutcome::InvalidKey => Err(GatewayError::new(
                GatewayErrorKind::InvalidBillingKey,
                "01",
                "[1195] billing key not registered",
                None,
            )
            .into()),
            MockOutcome::Timeout => Err(GatewayError::timeout().into()),
            MockOutcome::BadSignature => Err(BillingError::protocol("reply signature mismatch")),
        }
    }

    async fn query_order(
        &self,
        order_ref: &OrderReference,
        _requested_at: Timestamp,
    ) -> Result<OrderStatus, BillingError> {
        self.record("query_order", order_ref, None);
        Ok(self
            .state()
            .orders
            .get(&order_ref.to_string())
            .cloned()
            .unwrap_or(OrderStatus::Unknown))
    }
}
