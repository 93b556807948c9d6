use chrono::NaiveDate;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::loan::Loan;

/// year basis for daily interest (actual/365)
pub const DAYS_IN_YEAR: u32 = 365;

/// engine for daily interest accrual
#[derive(Debug, Clone, Copy)]
pub struct AccrualEngine {
    days_in_year: u32,
}

impl Default for AccrualEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AccrualEngine {
    pub fn new() -> Self {
        Self {
            days_in_year: DAYS_IN_YEAR,
        }
    }

    /// daily rate from an annual rate, exact decimal division
    pub fn daily_rate(&self, annual_rate: Rate) -> Result<Rate> {
        annual_rate
            .per_day(self.days_in_year)
            .ok_or_else(|| LedgerError::calculation("daily rate overflow"))
    }

    /// balance × (annual_rate / 365), unrounded
    pub fn daily_interest(&self, balance: Money, annual_rate: Rate) -> Result<DailyInterest> {
        let daily_rate = self.daily_rate(annual_rate)?;
        let interest_amount = balance
            .checked_mul_rate(daily_rate)
            .ok_or_else(|| LedgerError::calculation("daily interest overflow"))?;

        Ok(DailyInterest {
            daily_rate,
            interest_amount,
        })
    }

    /// decide what today's accrual pass does for `loan`
    pub fn evaluate(&self, loan: &Loan, today: NaiveDate) -> Result<AccrualDecision> {
        if loan.accrued_on(today) {
            return Ok(AccrualDecision::AlreadyAccrued);
        }

        let interest = self.daily_interest(loan.balance, loan.effective_rate)?;
        if !interest.interest_amount.is_positive() {
            return Ok(AccrualDecision::NothingToAccrue);
        }

        Ok(AccrualDecision::Accrue(DailyAccrual {
            date: today,
            daily_rate: interest.daily_rate,
            interest_amount: interest.interest_amount,
        }))
    }
}

/// one day of interest at a given rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyInterest {
    pub daily_rate: Rate,
    pub interest_amount: Money,
}

/// daily accrual record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyAccrual {
    pub date: NaiveDate,
    pub daily_rate: Rate,
    pub interest_amount: Money,
}

/// outcome of the accrual gate for one loan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualDecision {
    /// interest was already accrued for this date
    AlreadyAccrued,
    /// zero or negative rate, or zero balance
    NothingToAccrue,
    Accrue(DailyAccrual),
}
