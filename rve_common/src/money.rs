use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const RUB_CURRENCY_CODE: &str = "RUB";
pub const RUB_CURRENCY_CODE_LOWER: &str = "rub";

//--------------------------------------     MoneyAmount       -------------------------------------------------------
/// A monetary amount in minor currency units (kopecks). Amounts are always integral; receipts and
/// orders never carry sub-kopeck precision.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct MoneyAmount(i64);

op!(binary MoneyAmount, Add, add);
op!(binary MoneyAmount, Sub, sub);
op!(inplace MoneyAmount, SubAssign, sub_assign);
op!(unary MoneyAmount, Neg, neg);

impl Mul<i64> for MoneyAmount {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for MoneyAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor currency units: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for MoneyAmount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for MoneyAmount {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for MoneyAmount {}

impl TryFrom<u64> for MoneyAmount {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {} is too large to convert to MoneyAmount", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for MoneyAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}{}.{:02} ₽", abs / 100, abs % 100)
    }
}

impl MoneyAmount {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Whole rubles, no kopecks.
    pub fn from_rubles(rubles: i64) -> Self {
        Self(rubles * 100)
    }

    /// The absolute difference between two amounts, in minor units.
    pub fn abs_diff(&self, other: MoneyAmount) -> i64 {
        (self.0 - other.0).abs()
    }
}
