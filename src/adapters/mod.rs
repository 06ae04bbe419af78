//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing domain to external systems:
//! - `gateway` - card gateway clients (mock, v1, v2)
//! - `postgres` - PostgreSQL stores
//! - `memory` - in-memory stores for tests and local runs
//! - `notifier` - billing event delivery
//! - `clock` - system and manual clocks
//! - `http` - REST API

pub mod clock;
pub mod gateway;
pub mod http;
pub mod memory;
pub mod notifier;
pub mod postgres;

pub use clock::{ManualClock, SystemClock};
pub use gateway::{build_gateway, MockGatewayClient};
pub use notifier::{RecordingNotifier, TracingNotifier};
