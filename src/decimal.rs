use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// monetary amount with exact base-10 arithmetic.
///
/// values are never rounded: every operation keeps the full precision
/// `Decimal` can represent, and the checked variants report overflow
/// instead of panicking. serializes as decimal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    pub const ONE: Money = Money(Decimal::ONE);

    /// create from decimal
    pub fn from_decimal(d: Decimal) -> Self {
        Money(d)
    }

    /// create from string with exact parsing
    pub fn from_str_exact(s: &str) -> Result<Self, rust_decimal::Error> {
        Ok(Money(Decimal::from_str_exact(s)?))
    }

    /// create from integer amount (dollars, euros, etc)
    pub fn from_major(amount: i64) -> Self {
        Money(Decimal::from(amount))
    }

    /// create from minor amount (cents with scale 2)
    pub fn from_minor(amount: i64, scale: u32) -> Self {
        Money(Decimal::new(amount, scale))
    }

    /// get underlying decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// round to specified decimal places, for display only
    pub fn round_dp(&self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// strictly less than zero
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// multiply by a rate without intermediate rounding
    pub fn checked_mul_rate(self, rate: Rate) -> Option<Money> {
        self.0.checked_mul(rate.as_decimal()).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::from_str_exact(s)
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money::from_decimal(d)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money(self.0 + other.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        Money(self.0 - other.0)
    }
}

/// rate type for annual interest rates and variances (0.05 = 5%).
/// may be negative: a variance can lower the base rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    /// create from decimal (e.g., 0.05 for 5%)
    pub fn from_decimal(d: Decimal) -> Self {
        Rate(d)
    }

    /// create from string with exact parsing
    pub fn from_str_exact(s: &str) -> Result<Self, rust_decimal::Error> {
        Ok(Rate(Decimal::from_str_exact(s)?))
    }

    /// create from percentage (e.g., 5 for 5%)
    pub fn from_percentage(p: i32) -> Self {
        Rate(Decimal::from(p) / Decimal::from(100))
    }

    /// create from basis points (e.g., 500 for 5%)
    pub fn from_bps(bps: i32) -> Self {
        Rate(Decimal::from(bps) / Decimal::from(10000))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn checked_add(self, other: Rate) -> Option<Rate> {
        self.0.checked_add(other.0).map(Rate)
    }

    /// rate per day for the given year basis, exact to decimal precision
    pub fn per_day(&self, days_in_year: u32) -> Option<Rate> {
        self.0.checked_div(Decimal::from(days_in_year)).map(Rate)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Rate {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rate::from_str_exact(s)
    }
}

impl From<Decimal> for Rate {
    fn from(d: Decimal) -> Self {
        Rate::from_decimal(d)
    }
}
