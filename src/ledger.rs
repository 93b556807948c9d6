//! the ledger engine.
//!
//! every mutation follows the same shape: read the loan, decide and apply the
//! change on a copy, then commit the copy (plus at most one transaction)
//! against the version that was read. a conflicting commit re-reads and
//! re-decides, so every gate is evaluated against fresh state.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::interest::capitalization;
use crate::interest::{AccrualDecision, AccrualEngine, CapitalizationDecision, DailyAccrual};
use crate::loan::Loan;
use crate::reconcile::Reconciliation;
use crate::store::{LoanStore, StoreError};
use crate::transaction::Transaction;
use crate::types::{LoanId, StatementCycleDay};

/// counts for one batch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// active loans listed at the start of the pass
    pub examined: usize,
    pub applied: usize,
    /// gate said no: already accrued, not the cycle day, nothing to do
    pub skipped: usize,
    pub failed: usize,
    /// false if the pass could not list loans at all
    pub completed: bool,
}

/// what a mutation step decided for the loan it was given
enum Step<T> {
    /// leave the stored record alone
    Skip(T),
    /// commit the modified loan, appending the transaction if any
    Commit(T, Option<Transaction>),
}

/// loan ledger over a store, a clock and a random source
pub struct Ledger<S, C, R = StdRng> {
    store: S,
    clock: C,
    rng: Mutex<R>,
    accrual: AccrualEngine,
    config: LedgerConfig,
}

impl<S: LoanStore, C: Clock> Ledger<S, C, StdRng> {
    /// ledger drawing cycle days from `config.rng_seed`, or from entropy
    pub fn from_config(store: S, clock: C, config: LedgerConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_config(store, clock, rng, config)
    }
}

impl<S: LoanStore, C: Clock, R: Rng> Ledger<S, C, R> {
    pub fn new(store: S, clock: C, rng: R) -> Self {
        Self::with_config(store, clock, rng, LedgerConfig::default())
    }

    pub fn with_config(store: S, clock: C, rng: R, config: LedgerConfig) -> Self {
        Self {
            store,
            clock,
            rng: Mutex::new(rng),
            accrual: AccrualEngine::new(),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// originate a loan and record its disbursement in one commit
    pub fn create_loan(
        &self,
        customer_key: impl Into<String>,
        principal: Money,
        base_rate: Rate,
        rate_variance: Rate,
    ) -> Result<Loan> {
        if !principal.is_positive() {
            return Err(LedgerError::validation(format!(
                "principal must be positive, got {principal}"
            )));
        }

        let cycle_day = self.draw_cycle_day();
        let now = self.clock.now();
        let loan = Loan::originate(
            customer_key.into(),
            principal,
            base_rate,
            rate_variance,
            cycle_day,
            now,
        )?;
        let disbursement = Transaction::disbursement(loan.id, loan.principal, now);

        self.store.open_loan(&loan, &disbursement)?;

        info!(
            loan_id = %loan.id,
            principal = %loan.principal,
            effective_rate = %loan.effective_rate,
            statement_cycle_day = loan.statement_cycle_day.day(),
            "loan created"
        );
        Ok(loan)
    }

    pub fn get_loan(&self, id: LoanId) -> Result<Loan> {
        Ok(self.store.get_loan(id)?)
    }

    pub fn list_loans(&self) -> Result<Vec<Loan>> {
        Ok(self.store.list_all_loans()?)
    }

    /// audit trail for a loan, oldest first
    pub fn list_transactions(&self, id: LoanId) -> Result<Vec<Transaction>> {
        self.store.get_loan(id)?;
        Ok(self.store.list_transactions_for_loan(id)?)
    }

    /// replace the editable terms of a loan.
    ///
    /// only `customer_key` and the three rate fields are taken from `loan`;
    /// everything else comes from the stored record. closed loans are
    /// returned unchanged.
    pub fn update_loan(&self, loan: Loan) -> Result<Loan> {
        loan.check_rates()?;

        let (updated, changed) = self.mutate(loan.id, |current, _now| {
            if !current.is_active() {
                return Ok(Step::Skip(false));
            }
            current.customer_key = loan.customer_key.clone();
            current.base_rate = loan.base_rate;
            current.rate_variance = loan.rate_variance;
            current.effective_rate = loan.effective_rate;
            Ok(Step::Commit(true, None))
        })?;

        if changed {
            info!(loan_id = %updated.id, effective_rate = %updated.effective_rate, "loan updated");
        } else {
            warn!(loan_id = %updated.id, status = %updated.status, "update ignored, loan is not active");
        }
        Ok(updated)
    }

    /// remove a loan and its transactions
    pub fn delete_loan(&self, id: LoanId) -> Result<()> {
        self.store.delete_loan(id)?;
        info!(loan_id = %id, "loan deleted");
        Ok(())
    }

    /// apply a payment; a payment covering the balance closes the loan.
    ///
    /// the returned transaction carries the amount as paid, even when part
    /// of it was absorbed by the closure.
    pub fn record_payment(&self, id: LoanId, amount: Money) -> Result<Transaction> {
        if !amount.is_positive() {
            return Err(LedgerError::validation(format!(
                "payment amount must be positive, got {amount}"
            )));
        }

        let (loan, (transaction, outcome)) = self.mutate(id, |loan, now| {
            let outcome = loan.apply_payment(amount)?;
            let transaction = Transaction::payment(loan.id, amount, now);
            Ok(Step::Commit((transaction.clone(), outcome), Some(transaction)))
        })?;

        info!(
            loan_id = %loan.id,
            amount = %amount,
            balance = %loan.balance,
            closed = outcome.closed,
            "payment recorded"
        );
        if outcome.absorbed_overpayment.is_positive() {
            warn!(
                loan_id = %loan.id,
                absorbed = %outcome.absorbed_overpayment,
                "overpayment absorbed on closure"
            );
        }
        Ok(transaction)
    }

    /// accrue today's interest for one loan; `None` when a gate skipped it
    pub fn accrue_loan(&self, id: LoanId) -> Result<Option<DailyAccrual>> {
        let (loan, accrual) = self.mutate(id, |loan, now| {
            if !loan.is_active() {
                return Ok(Step::Skip(None));
            }
            match self.accrual.evaluate(loan, now.date_naive())? {
                AccrualDecision::Accrue(accrual) => {
                    loan.apply_accrual(&accrual)?;
                    Ok(Step::Commit(Some(accrual), None))
                }
                decision => {
                    debug!(loan_id = %loan.id, ?decision, "accrual skipped");
                    Ok(Step::Skip(None))
                }
            }
        })?;

        if let Some(accrual) = &accrual {
            debug!(
                loan_id = %loan.id,
                date = %accrual.date,
                interest = %accrual.interest_amount,
                accrued = %loan.accrued_interest,
                "interest accrued"
            );
        }
        Ok(accrual)
    }

    /// capitalize accrued interest for one loan if today is its cycle day;
    /// returns the interest transaction written
    pub fn capitalize_loan(&self, id: LoanId) -> Result<Option<Transaction>> {
        let (loan, transaction) = self.mutate(id, |loan, now| {
            if !loan.is_active() {
                return Ok(Step::Skip(None));
            }
            match capitalization::evaluate(loan, now.date_naive())? {
                CapitalizationDecision::Capitalize(result) => {
                    loan.apply_capitalization(&result);
                    let transaction = Transaction::interest(loan.id, result.amount_capitalized, now);
                    Ok(Step::Commit(Some(transaction.clone()), Some(transaction)))
                }
                decision => {
                    debug!(loan_id = %loan.id, ?decision, "capitalization skipped");
                    Ok(Step::Skip(None))
                }
            }
        })?;

        if let Some(transaction) = &transaction {
            info!(
                loan_id = %loan.id,
                amount = %transaction.amount,
                balance = %loan.balance,
                "interest capitalized"
            );
        }
        Ok(transaction)
    }

    /// accrue one day of interest on every active loan
    pub fn run_daily_accrual(&self) -> BatchSummary {
        self.run_batch("daily_accrual", |id| Ok(self.accrue_loan(id)?.is_some()))
    }

    /// capitalize accrued interest on every active loan whose cycle day is today
    pub fn run_monthly_capitalization(&self) -> BatchSummary {
        self.run_batch("monthly_capitalization", |id| Ok(self.capitalize_loan(id)?.is_some()))
    }

    /// accrual followed by capitalization
    pub fn run_daily_cycle(&self) -> (BatchSummary, BatchSummary) {
        let accrual = self.run_daily_accrual();
        let capitalization = self.run_monthly_capitalization();
        (accrual, capitalization)
    }

    /// replay a loan's transactions against its stored balance
    pub fn reconcile(&self, id: LoanId) -> Result<Reconciliation> {
        let loan = self.store.get_loan(id)?;
        let transactions = self.store.list_transactions_for_loan(id)?;
        let recon = Reconciliation::replay(&loan, &transactions)?;

        if !recon.is_balanced() {
            warn!(
                loan_id = %id,
                stored = %recon.stored_balance,
                replayed = %recon.replayed_balance,
                "balance does not match transaction trail"
            );
        }
        Ok(recon)
    }

    fn draw_cycle_day(&self) -> StatementCycleDay {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        StatementCycleDay::random(&mut *rng)
    }

    /// optimistic read-modify-write of one loan.
    ///
    /// `step` sees a fresh copy of the stored loan on every attempt. on
    /// `Skip` the stored loan is returned as read.
    fn mutate<T>(
        &self,
        id: LoanId,
        mut step: impl FnMut(&mut Loan, DateTime<Utc>) -> Result<Step<T>>,
    ) -> Result<(Loan, T)> {
        let max_attempts = self.config.max_commit_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let stored = self.store.get_loan(id)?;
            let expected_version = stored.version;
            let now = self.clock.now();

            let mut next = stored.clone();
            let (value, transaction) = match step(&mut next, now)? {
                Step::Skip(value) => return Ok((stored, value)),
                Step::Commit(value, transaction) => (value, transaction),
            };

            next.next_revision(now);
            next.check_invariants()?;

            match self.store.commit_loan(&next, expected_version, transaction.as_ref()) {
                Ok(()) => return Ok((next, value)),
                Err(err @ StoreError::Conflict { .. }) if attempt < max_attempts => {
                    warn!(loan_id = %id, attempt, error = %err, "commit conflict, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn run_batch(&self, pass: &'static str, mut each: impl FnMut(LoanId) -> Result<bool>) -> BatchSummary {
        let mut summary = BatchSummary::default();

        let loans = match self.store.list_active_loans() {
            Ok(loans) => loans,
            Err(err) => {
                error!(pass, error = %err, "cannot list active loans");
                return summary;
            }
        };

        for loan in loans {
            summary.examined += 1;
            match each(loan.id) {
                Ok(true) => summary.applied += 1,
                Ok(false) => summary.skipped += 1,
                // deleted since the listing
                Err(LedgerError::NotFound { .. }) => summary.skipped += 1,
                Err(err) => {
                    summary.failed += 1;
                    error!(pass, loan_id = %loan.id, error = %err, "loan failed, continuing");
                }
            }
        }
        summary.completed = true;

        info!(
            pass,
            examined = summary.examined,
            applied = summary.applied,
            skipped = summary.skipped,
            failed = summary.failed,
            "batch finished"
        );
        summary
    }
}
