use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::interest::{CapitalizationResult, DailyAccrual};
use crate::types::{LoanId, LoanStatus, StatementCycleDay};

/// loan record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    // identification
    pub id: LoanId,
    pub customer_key: String,

    // balances
    pub principal: Money,
    pub balance: Money,
    pub accrued_interest: Money,

    // pricing, effective_rate is fixed at origination
    pub base_rate: Rate,
    pub rate_variance: Rate,
    pub effective_rate: Rate,

    // interest schedule
    pub statement_cycle_day: StatementCycleDay,
    pub last_accrual_date: Option<NaiveDate>,

    pub status: LoanStatus,

    /// revision counter for optimistic concurrency
    #[serde(default)]
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// result of applying a payment to a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub previous_balance: Money,
    pub new_balance: Money,
    /// part of the payment beyond the outstanding balance, absorbed on closure
    pub absorbed_overpayment: Money,
    pub closed: bool,
}

impl Loan {
    /// originate a new active loan
    pub fn originate(
        customer_key: String,
        principal: Money,
        base_rate: Rate,
        rate_variance: Rate,
        statement_cycle_day: StatementCycleDay,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if !principal.is_positive() {
            return Err(LedgerError::validation(format!(
                "principal must be positive, got {principal}"
            )));
        }

        let effective_rate = base_rate
            .checked_add(rate_variance)
            .ok_or_else(|| LedgerError::calculation("effective rate overflow"))?;

        Ok(Self {
            id: Uuid::new_v4(),
            customer_key,
            principal,
            balance: principal,
            accrued_interest: Money::ZERO,
            base_rate,
            rate_variance,
            effective_rate,
            statement_cycle_day,
            last_accrual_date: None,
            status: LoanStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    /// true if interest was already accrued for `date`
    pub fn accrued_on(&self, date: NaiveDate) -> bool {
        self.last_accrual_date == Some(date)
    }

    /// check the record-level invariants
    pub fn check_invariants(&self) -> Result<()> {
        if self.balance.is_negative() {
            return Err(LedgerError::validation(format!(
                "balance must not be negative, got {}",
                self.balance
            )));
        }
        if self.accrued_interest.is_negative() {
            return Err(LedgerError::validation(format!(
                "accrued interest must not be negative, got {}",
                self.accrued_interest
            )));
        }
        if self.status == LoanStatus::Closed && !self.balance.is_zero() {
            return Err(LedgerError::validation(format!(
                "closed loan must have zero balance, got {}",
                self.balance
            )));
        }
        self.check_rates()
    }

    /// effective rate must equal base rate plus variance
    pub fn check_rates(&self) -> Result<()> {
        let expected = self
            .base_rate
            .checked_add(self.rate_variance)
            .ok_or_else(|| LedgerError::calculation("effective rate overflow"))?;

        if expected != self.effective_rate {
            return Err(LedgerError::validation(format!(
                "effective rate {} does not equal base rate {} plus variance {}",
                self.effective_rate, self.base_rate, self.rate_variance
            )));
        }
        Ok(())
    }

    /// add one day of interest
    pub fn apply_accrual(&mut self, accrual: &DailyAccrual) -> Result<()> {
        self.accrued_interest = self
            .accrued_interest
            .checked_add(accrual.interest_amount)
            .ok_or_else(|| LedgerError::calculation("accrued interest overflow"))?;
        self.last_accrual_date = Some(accrual.date);
        Ok(())
    }

    /// fold accrued interest into the balance
    pub fn apply_capitalization(&mut self, result: &CapitalizationResult) {
        self.balance = result.new_balance;
        self.accrued_interest = Money::ZERO;
    }

    /// reduce the balance by `amount`, closing the loan when it reaches zero.
    /// an overpayment is clamped away, not refunded.
    pub fn apply_payment(&mut self, amount: Money) -> Result<PaymentOutcome> {
        if !amount.is_positive() {
            return Err(LedgerError::validation(format!(
                "payment amount must be positive, got {amount}"
            )));
        }
        if !self.is_active() {
            return Err(LedgerError::InvalidState {
                id: self.id,
                status: self.status,
            });
        }

        let previous_balance = self.balance;
        let remaining = previous_balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::calculation("balance underflow"))?;

        let outcome = if remaining.is_positive() {
            self.balance = remaining;
            PaymentOutcome {
                previous_balance,
                new_balance: remaining,
                absorbed_overpayment: Money::ZERO,
                closed: false,
            }
        } else {
            self.balance = Money::ZERO;
            self.status = LoanStatus::Closed;
            PaymentOutcome {
                previous_balance,
                new_balance: Money::ZERO,
                absorbed_overpayment: Money::ZERO - remaining,
                closed: true,
            }
        };

        Ok(outcome)
    }

    /// stamp a mutation: refresh updated_at and bump the revision
    pub fn next_revision(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}
