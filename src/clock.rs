use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use std::sync::Arc;

/// source of "now" for the ledger.
///
/// every date gate in the engine reads time through this trait, so tests can
/// drive accrual and capitalization with `hourglass_rs` test time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

impl Clock for SafeTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        SafeTimeProvider::now(self)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
