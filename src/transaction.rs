use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{LoanId, TransactionId, TransactionType};

/// immutable entry in a loan's audit trail.
///
/// one is written for every balance-affecting event. `amount` is always a
/// positive magnitude; `transaction_type` gives the direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub loan_id: LoanId,
    pub amount: Money,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        loan_id: LoanId,
        transaction_type: TransactionType,
        amount: Money,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            amount,
            transaction_type,
            timestamp,
        }
    }

    pub fn disbursement(loan_id: LoanId, amount: Money, timestamp: DateTime<Utc>) -> Self {
        Self::new(loan_id, TransactionType::Disbursement, amount, timestamp)
    }

    pub fn payment(loan_id: LoanId, amount: Money, timestamp: DateTime<Utc>) -> Self {
        Self::new(loan_id, TransactionType::Payment, amount, timestamp)
    }

    pub fn interest(loan_id: LoanId, amount: Money, timestamp: DateTime<Utc>) -> Self {
        Self::new(loan_id, TransactionType::Interest, amount, timestamp)
    }
}
