//! persistence contract consumed by the ledger.
//!
//! the store only keeps what it is given. it never originates business
//! values, but it owns atomicity: every method that touches more than one
//! row commits all of it or none of it.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;
use thiserror::Error;

use crate::loan::Loan;
use crate::transaction::Transaction;
use crate::types::LoanId;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("loan not found: {id}")]
    LoanNotFound {
        id: LoanId,
    },

    #[error("loan already exists: {id}")]
    DuplicateLoan {
        id: LoanId,
    },

    /// optimistic-concurrency rejection: the stored revision moved
    #[error("concurrent modification of loan {id}: expected version {expected}, found {found}")]
    Conflict {
        id: LoanId,
        expected: u64,
        found: u64,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// a stored value could not be decoded, or a write pairs records
    /// that do not belong together
    #[error("corrupt record: {message}")]
    Corrupt {
        message: String,
    },

    #[error("store lock poisoned")]
    LockPoisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// a transaction is only ever written together with the loan it belongs to
fn check_owner(loan: &Loan, transaction: &Transaction) -> StoreResult<()> {
    if transaction.loan_id != loan.id {
        return Err(StoreError::Corrupt {
            message: format!(
                "transaction {} belongs to loan {}, not {}",
                transaction.id, transaction.loan_id, loan.id
            ),
        });
    }
    Ok(())
}

/// loan and transaction storage.
///
/// implementations must be safe to share between threads; the ledger relies
/// on `commit_loan` for per-loan read-modify-write atomicity.
pub trait LoanStore: Send + Sync {
    fn create_loan(&self, loan: &Loan) -> StoreResult<()>;

    fn get_loan(&self, id: LoanId) -> StoreResult<Loan>;

    /// whole-record replace, matched by id
    fn update_loan(&self, loan: &Loan) -> StoreResult<()>;

    /// delete the loan and all its transactions atomically
    fn delete_loan(&self, id: LoanId) -> StoreResult<()>;

    fn list_all_loans(&self) -> StoreResult<Vec<Loan>>;

    fn list_active_loans(&self) -> StoreResult<Vec<Loan>>;

    /// append to the audit trail; the owning loan must exist
    fn create_transaction(&self, transaction: &Transaction) -> StoreResult<()>;

    /// ordered by timestamp ascending, insertion order breaking ties
    fn list_transactions_for_loan(&self, id: LoanId) -> StoreResult<Vec<Transaction>>;

    /// insert a new loan together with its disbursement record
    fn open_loan(&self, loan: &Loan, disbursement: &Transaction) -> StoreResult<()>;

    /// replace the loan if its stored version equals `expected_version`, and
    /// append `transaction` if given, as one atomic unit
    fn commit_loan(
        &self,
        loan: &Loan,
        expected_version: u64,
        transaction: Option<&Transaction>,
    ) -> StoreResult<()>;
}

impl<T: LoanStore + ?Sized> LoanStore for Arc<T> {
    fn create_loan(&self, loan: &Loan) -> StoreResult<()> {
        (**self).create_loan(loan)
    }

    fn get_loan(&self, id: LoanId) -> StoreResult<Loan> {
        (**self).get_loan(id)
    }

    fn update_loan(&self, loan: &Loan) -> StoreResult<()> {
        (**self).update_loan(loan)
    }

    fn delete_loan(&self, id: LoanId) -> StoreResult<()> {
        (**self).delete_loan(id)
    }

    fn list_all_loans(&self) -> StoreResult<Vec<Loan>> {
        (**self).list_all_loans()
    }

    fn list_active_loans(&self) -> StoreResult<Vec<Loan>> {
        (**self).list_active_loans()
    }

    fn create_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        (**self).create_transaction(transaction)
    }

    fn list_transactions_for_loan(&self, id: LoanId) -> StoreResult<Vec<Transaction>> {
        (**self).list_transactions_for_loan(id)
    }

    fn open_loan(&self, loan: &Loan, disbursement: &Transaction) -> StoreResult<()> {
        (**self).open_loan(loan, disbursement)
    }

    fn commit_loan(
        &self,
        loan: &Loan,
        expected_version: u64,
        transaction: Option<&Transaction>,
    ) -> StoreResult<()> {
        (**self).commit_loan(loan, expected_version, transaction)
    }
}

impl<T: LoanStore + ?Sized> LoanStore for Box<T> {
    fn create_loan(&self, loan: &Loan) -> StoreResult<()> {
        (**self).create_loan(loan)
    }

    fn get_loan(&self, id: LoanId) -> StoreResult<Loan> {
        (**self).get_loan(id)
    }

    fn update_loan(&self, loan: &Loan) -> StoreResult<()> {
        (**self).update_loan(loan)
    }

    fn delete_loan(&self, id: LoanId) -> StoreResult<()> {
        (**self).delete_loan(id)
    }

    fn list_all_loans(&self) -> StoreResult<Vec<Loan>> {
        (**self).list_all_loans()
    }

    fn list_active_loans(&self) -> StoreResult<Vec<Loan>> {
        (**self).list_active_loans()
    }

    fn create_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        (**self).create_transaction(transaction)
    }

    fn list_transactions_for_loan(&self, id: LoanId) -> StoreResult<Vec<Transaction>> {
        (**self).list_transactions_for_loan(id)
    }

    fn open_loan(&self, loan: &Loan, disbursement: &Transaction) -> StoreResult<()> {
        (**self).open_loan(loan, disbursement)
    }

    fn commit_loan(
        &self,
        loan: &Loan,
        expected_version: u64,
        transaction: Option<&Transaction>,
    ) -> StoreResult<()> {
        (**self).commit_loan(loan, expected_version, transaction)
    }
}
