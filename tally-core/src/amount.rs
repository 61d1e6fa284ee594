use std::fmt;
use std::ops::{Add, AddAssign};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Signed amount expressed as `num / denom` in the smallest unit of a commodity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ScaledAmount {
    pub num: i64,
    pub denom: i64,
}

impl ScaledAmount {
    pub fn new(num: i64, denom: i64) -> Self {
        Self { num, denom }
    }

    /// Convert to a decimal, `None` when the denominator is zero.
    pub fn to_decimal(&self) -> Option<Decimal> {
        Decimal::from(self.num).checked_div(Decimal::from(self.denom))
    }
}

impl fmt::Display for ScaledAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Some(value) => write!(f, "{}", value.normalize()),
            None => write!(f, "{}/{}", self.num, self.denom),
        }
    }
}

/// Raw, cleared and reconciled sums tracked side by side.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BalanceTriple {
    pub balance: i64,
    pub cleared: i64,
    pub reconciled: i64,
}

impl BalanceTriple {
    pub const ZERO: Self = Self {
        balance: 0,
        cleared: 0,
        reconciled: 0,
    };

    pub fn new(balance: i64, cleared: i64, reconciled: i64) -> Self {
        Self {
            balance,
            cleared,
            reconciled,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Attach the commodity denominator to every sum.
    pub fn scaled(self, denom: i64) -> StartingBalances {
        StartingBalances {
            balance: ScaledAmount::new(self.balance, denom),
            cleared: ScaledAmount::new(self.cleared, denom),
            reconciled: ScaledAmount::new(self.reconciled, denom),
        }
    }
}

impl Add for BalanceTriple {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            balance: self.balance + rhs.balance,
            cleared: self.cleared + rhs.cleared,
            reconciled: self.reconciled + rhs.reconciled,
        }
    }
}

impl AddAssign for BalanceTriple {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Balances an account starts from at a given as-of date.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StartingBalances {
    pub balance: ScaledAmount,
    pub cleared: ScaledAmount,
    pub reconciled: ScaledAmount,
}
