//! audit-trail replay.
//!
//! the stored balance of a loan must always be reproducible from its
//! transactions: the disbursement opens the balance, interest adds to it and
//! payments reduce it, clamping at zero on the closing payment.

use serde::Serialize;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::loan::Loan;
use crate::transaction::Transaction;
use crate::types::{LoanId, TransactionType};

/// replayed view of one loan's transaction trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub loan_id: LoanId,
    pub transaction_count: usize,
    pub total_disbursed: Money,
    pub total_interest: Money,
    /// payments as recorded, including any overpayment
    pub total_payments: Money,
    /// payment amounts beyond the balance they closed
    pub absorbed_overpayment: Money,
    pub replayed_balance: Money,
    pub stored_balance: Money,
    /// interest accrued but not yet capitalized, never in the trail
    pub pending_interest: Money,
}

impl Reconciliation {
    /// replay `transactions` (ascending timestamp order) against `loan`
    pub fn replay(loan: &Loan, transactions: &[Transaction]) -> Result<Self> {
        let overflow = || LedgerError::calculation("overflow while replaying transactions");

        let mut recon = Self {
            loan_id: loan.id,
            transaction_count: transactions.len(),
            total_disbursed: Money::ZERO,
            total_interest: Money::ZERO,
            total_payments: Money::ZERO,
            absorbed_overpayment: Money::ZERO,
            replayed_balance: Money::ZERO,
            stored_balance: loan.balance,
            pending_interest: loan.accrued_interest,
        };

        for tx in transactions {
            if tx.loan_id != loan.id {
                return Err(LedgerError::validation(format!(
                    "transaction {} belongs to loan {}, not {}",
                    tx.id, tx.loan_id, loan.id
                )));
            }

            match tx.transaction_type {
                TransactionType::Disbursement => {
                    recon.total_disbursed = recon.total_disbursed.checked_add(tx.amount).ok_or_else(overflow)?;
                    recon.replayed_balance = tx.amount;
                }
                TransactionType::Interest => {
                    recon.total_interest = recon.total_interest.checked_add(tx.amount).ok_or_else(overflow)?;
                    recon.replayed_balance = recon.replayed_balance.checked_add(tx.amount).ok_or_else(overflow)?;
                }
                TransactionType::Payment => {
                    recon.total_payments = recon.total_payments.checked_add(tx.amount).ok_or_else(overflow)?;
                    let remaining = recon.replayed_balance.checked_sub(tx.amount).ok_or_else(overflow)?;
                    if remaining.is_negative() {
                        recon.absorbed_overpayment = recon
                            .absorbed_overpayment
                            .checked_sub(remaining)
                            .ok_or_else(overflow)?;
                        recon.replayed_balance = Money::ZERO;
                    } else {
                        recon.replayed_balance = remaining;
                    }
                }
            }
        }

        Ok(recon)
    }

    pub fn is_balanced(&self) -> bool {
        self.replayed_balance == self.stored_balance
    }

    /// stored minus replayed balance; zero when balanced
    pub fn discrepancy(&self) -> Money {
        self.stored_balance - self.replayed_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::types::StatementCycleDay;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn loan() -> Loan {
        Loan::originate(
            "cust-r".to_string(),
            Money::from_decimal(dec!(1000.00)),
            Rate::from_percentage(10),
            Rate::ZERO,
            StatementCycleDay::new(3).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_replay_matches_stored_balance() {
        let mut loan = loan();
        let t0 = loan.created_at;
        let trail = vec![
            Transaction::disbursement(loan.id, loan.principal, t0),
            Transaction::interest(loan.id, Money::from_decimal(dec!(5.00)), t0 + Duration::days(2)),
            Transaction::payment(loan.id, Money::from_decimal(dec!(200.00)), t0 + Duration::days(3)),
        ];
        loan.balance = Money::from_decimal(dec!(805.00));
        loan.accrued_interest = Money::from_decimal(dec!(0.22));

        let recon = Reconciliation::replay(&loan, &trail).unwrap();

        assert!(recon.is_balanced());
        assert_eq!(recon.total_interest, Money::from_decimal(dec!(5.00)));
        assert_eq!(recon.total_payments, Money::from_decimal(dec!(200.00)));
        assert_eq!(recon.pending_interest, Money::from_decimal(dec!(0.22)));
        assert_eq!(recon.discrepancy(), Money::ZERO);
    }

    #[test]
    fn test_closing_overpayment_is_absorbed() {
        let mut loan = loan();
        let t0 = loan.created_at;
        let trail = vec![
            Transaction::disbursement(loan.id, loan.principal, t0),
            Transaction::payment(loan.id, Money::from_decimal(dec!(1050.00)), t0 + Duration::days(1)),
        ];
        loan.balance = Money::ZERO;

        let recon = Reconciliation::replay(&loan, &trail).unwrap();

        assert!(recon.is_balanced());
        assert_eq!(recon.absorbed_overpayment, Money::from_decimal(dec!(50.00)));
    }

    #[test]
    fn test_detects_drift() {
        let mut loan = loan();
        let trail = vec![Transaction::disbursement(loan.id, loan.principal, loan.created_at)];
        // balance moved without a transaction
        loan.balance = Money::from_decimal(dec!(1001.00));

        let recon = Reconciliation::replay(&loan, &trail).unwrap();

        assert!(!recon.is_balanced());
        assert_eq!(recon.discrepancy(), Money::from_decimal(dec!(1.00)));
    }

    #[test]
    fn test_rejects_foreign_transaction() {
        let loan = loan();
        let other = Transaction::payment(uuid::Uuid::new_v4(), Money::ONE, loan.created_at);
        assert!(matches!(
            Reconciliation::replay(&loan, &[other]),
            Err(LedgerError::Validation { .. })
        ));
    }
}
