use chrono::{Datelike, NaiveDate};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::loan::Loan;

/// interest capitalization result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapitalizationResult {
    pub amount_capitalized: Money,
    pub new_balance: Money,
}

/// outcome of the statement-cycle gate for one loan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapitalizationDecision {
    NotCycleDay,
    NothingAccrued,
    Capitalize(CapitalizationResult),
}

/// capitalize accrued interest into the balance
pub fn capitalize_interest(balance: Money, accrued_interest: Money) -> Result<CapitalizationResult> {
    let new_balance = balance
        .checked_add(accrued_interest)
        .ok_or_else(|| LedgerError::calculation("balance overflow on capitalization"))?;

    Ok(CapitalizationResult {
        amount_capitalized: accrued_interest,
        new_balance,
    })
}

/// decide what today's capitalization pass does for `loan`
pub fn evaluate(loan: &Loan, today: NaiveDate) -> Result<CapitalizationDecision> {
    if !loan.statement_cycle_day.matches(today.day()) {
        return Ok(CapitalizationDecision::NotCycleDay);
    }
    if !loan.accrued_interest.is_positive() {
        return Ok(CapitalizationDecision::NothingAccrued);
    }

    capitalize_interest(loan.balance, loan.accrued_interest)
        .map(CapitalizationDecision::Capitalize)
}
