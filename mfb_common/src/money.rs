use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "USD";
pub const DEFAULT_CURRENCY_CODE_LOWER: &str = "usd";

//--------------------------------------        Cents        ---------------------------------------------------------
/// Monetary amounts are stored as integer cents. Negative values are legal and represent reversals.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Cents(i64);

op!(binary Cents, Add, add);
op!(binary Cents, Sub, sub);
op!(inplace Cents, SubAssign, sub_assign);
op!(unary Cents, Neg, neg);

impl Mul<i64> for Cents {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in cents: {0}")]
pub struct CentsConversionError(String);

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Cents {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Cents {}

impl TryFrom<u64> for Cents {
    type Error = CentsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(CentsConversionError(format!("Value {} is too large to convert to Cents", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / 100;
        let frac = (self.0 % 100).abs();
        write!(f, "${whole}.{frac:02}")
    }
}

impl Cents {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Applies a permille rate, truncating towards zero. The remainder stays with whoever keeps the
    /// balance of the split.
    pub fn apply_permille(&self, rate: i64) -> Self {
        Self(self.0 * rate / 1000)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_formats_dollars_and_cents() {
        assert_eq!(Cents::from(123_456).to_string(), "$1234.56");
        assert_eq!(Cents::from(5).to_string(), "$0.05");
        assert_eq!(Cents::from(-250).to_string(), "$-2.50");
    }

    #[test]
    fn permille_splits_truncate() {
        let amount = Cents::from(100_000);
        assert_eq!(amount.apply_permille(150), Cents::from(15_000));
        assert_eq!(amount.apply_permille(200), Cents::from(20_000));
        // 999 cents at 15% leaves the odd cent with the platform
        assert_eq!(Cents::from(999).apply_permille(150), Cents::from(149));
    }

    #[test]
    fn arithmetic_ops() {
        let a = Cents::from(500);
        let b = Cents::from(200);
        assert_eq!(a + b, Cents::from(700));
        assert_eq!(a - b, Cents::from(300));
        assert_eq!(-a, Cents::from(-500));
        let mut c = a;
        c -= b;
        assert_eq!(c, Cents::from(300));
        assert_eq!(vec![a, b].into_iter().sum::<Cents>(), Cents::from(700));
    }
}
