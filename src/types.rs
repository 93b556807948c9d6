use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a ledger transaction
pub type TransactionId = Uuid;

/// loan status. `Active` is initial, `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// performing, accrues interest and accepts payments
    Active,
    /// paid off
    Closed,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LoanStatus::Active),
            "closed" => Ok(LoanStatus::Closed),
            other => Err(format!("unknown loan status: {other}")),
        }
    }
}

/// kind of balance-affecting event. amounts are always positive,
/// the direction is implied by the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// initial transfer of principal
    Disbursement,
    /// money received from the borrower
    Payment,
    /// accrued interest folded into the balance
    Interest,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Disbursement => "disbursement",
            TransactionType::Payment => "payment",
            TransactionType::Interest => "interest",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disbursement" => Ok(TransactionType::Disbursement),
            "payment" => Ok(TransactionType::Payment),
            "interest" => Ok(TransactionType::Interest),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

/// day of month on which accrued interest is capitalized.
///
/// restricted to 1..=28 so every month has exactly one cycle day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct StatementCycleDay(u8);

impl StatementCycleDay {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 28;

    pub fn new(day: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&day).then_some(StatementCycleDay(day))
    }

    /// draw a cycle day uniformly from 1..=28.
    /// only spreads batch load across the month, carries no business meaning.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        StatementCycleDay(rng.gen_range(Self::MIN..=Self::MAX))
    }

    pub fn day(&self) -> u8 {
        self.0
    }

    /// true when `day_of_month` (1-based, as from `chrono::Datelike::day`) is this cycle day
    pub fn matches(&self, day_of_month: u32) -> bool {
        u32::from(self.0) == day_of_month
    }
}

impl TryFrom<u8> for StatementCycleDay {
    type Error = String;

    fn try_from(day: u8) -> Result<Self, Self::Error> {
        StatementCycleDay::new(day)
            .ok_or_else(|| format!("statement cycle day {day} outside 1..=28"))
    }
}

impl From<StatementCycleDay> for u8 {
    fn from(day: StatementCycleDay) -> u8 {
        day.0
    }
}

impl fmt::Display for StatementCycleDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
