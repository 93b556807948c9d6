use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{check_owner, LoanStore, StoreError, StoreResult};
use crate::loan::Loan;
use crate::transaction::Transaction;
use crate::types::LoanId;

#[derive(Debug, Default)]
struct Tables {
    loans: HashMap<LoanId, Loan>,
    // per-loan audit trail, in insertion order
    transactions: HashMap<LoanId, Vec<Transaction>>,
}

/// in-memory loan store.
///
/// intended for tests and single-process use. every operation runs under one
/// lock, so multi-row writes are atomic by construction.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn sorted_loans<'a>(loans: impl Iterator<Item = &'a Loan>) -> Vec<Loan> {
        let mut loans: Vec<Loan> = loans.cloned().collect();
        loans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        loans
    }
}

impl LoanStore for InMemoryStore {
    fn create_loan(&self, loan: &Loan) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.loans.contains_key(&loan.id) {
            return Err(StoreError::DuplicateLoan { id: loan.id });
        }
        tables.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    fn get_loan(&self, id: LoanId) -> StoreResult<Loan> {
        self.read()?
            .loans
            .get(&id)
            .cloned()
            .ok_or(StoreError::LoanNotFound { id })
    }

    fn update_loan(&self, loan: &Loan) -> StoreResult<()> {
        let mut tables = self.write()?;
        let stored = tables
            .loans
            .get_mut(&loan.id)
            .ok_or(StoreError::LoanNotFound { id: loan.id })?;
        *stored = loan.clone();
        Ok(())
    }

    fn delete_loan(&self, id: LoanId) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.loans.remove(&id).is_none() {
            return Err(StoreError::LoanNotFound { id });
        }
        tables.transactions.remove(&id);
        Ok(())
    }

    fn list_all_loans(&self) -> StoreResult<Vec<Loan>> {
        let tables = self.read()?;
        Ok(Self::sorted_loans(tables.loans.values()))
    }

    fn list_active_loans(&self) -> StoreResult<Vec<Loan>> {
        let tables = self.read()?;
        Ok(Self::sorted_loans(tables.loans.values().filter(|l| l.is_active())))
    }

    fn create_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        let mut tables = self.write()?;
        if !tables.loans.contains_key(&transaction.loan_id) {
            return Err(StoreError::LoanNotFound { id: transaction.loan_id });
        }
        tables
            .transactions
            .entry(transaction.loan_id)
            .or_default()
            .push(transaction.clone());
        Ok(())
    }

    fn list_transactions_for_loan(&self, id: LoanId) -> StoreResult<Vec<Transaction>> {
        let tables = self.read()?;
        let mut transactions = tables.transactions.get(&id).cloned().unwrap_or_default();
        // stable: equal timestamps keep insertion order
        transactions.sort_by_key(|t| t.timestamp);
        Ok(transactions)
    }

    fn open_loan(&self, loan: &Loan, disbursement: &Transaction) -> StoreResult<()> {
        check_owner(loan, disbursement)?;

        let mut tables = self.write()?;
        if tables.loans.contains_key(&loan.id) {
            return Err(StoreError::DuplicateLoan { id: loan.id });
        }
        tables.loans.insert(loan.id, loan.clone());
        tables
            .transactions
            .entry(loan.id)
            .or_default()
            .push(disbursement.clone());
        Ok(())
    }

    fn commit_loan(
        &self,
        loan: &Loan,
        expected_version: u64,
        transaction: Option<&Transaction>,
    ) -> StoreResult<()> {
        if let Some(transaction) = transaction {
            check_owner(loan, transaction)?;
        }

        let mut tables = self.write()?;
        let tables = &mut *tables;

        let stored = tables
            .loans
            .get_mut(&loan.id)
            .ok_or(StoreError::LoanNotFound { id: loan.id })?;

        if stored.version != expected_version {
            return Err(StoreError::Conflict {
                id: loan.id,
                expected: expected_version,
                found: stored.version,
            });
        }

        *stored = loan.clone();
        if let Some(transaction) = transaction {
            tables
                .transactions
                .entry(loan.id)
                .or_default()
                .push(transaction.clone());
        }
        Ok(())
    }
}
