pub mod accrual;
pub mod capitalization;

pub use accrual::{AccrualDecision, AccrualEngine, DailyAccrual, DAYS_IN_YEAR};
pub use capitalization::{CapitalizationDecision, CapitalizationResult};
