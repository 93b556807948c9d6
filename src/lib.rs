pub mod clock;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod interest;
pub mod ledger;
pub mod loan;
pub mod reconcile;
pub mod store;
pub mod telemetry;
pub mod transaction;
pub mod types;

// re-export key types
pub use clock::Clock;
pub use config::{LedgerConfig, LogFormat, LoggingConfig, StorageConfig};
pub use decimal::{Money, Rate};
pub use errors::{ErrorKind, LedgerError, Result};
pub use interest::{AccrualEngine, DailyAccrual, DAYS_IN_YEAR};
pub use ledger::{BatchSummary, Ledger};
pub use loan::{Loan, PaymentOutcome};
pub use reconcile::Reconciliation;
pub use store::{InMemoryStore, LoanStore, SqliteStore, StoreError, StoreResult};
pub use transaction::Transaction;
pub use types::{LoanId, LoanStatus, StatementCycleDay, TransactionId, TransactionType};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
