//! Clock port so scheduling decisions can be tested with a controlled time.

use crate::domain::foundation::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}
