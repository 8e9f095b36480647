// Monetary amounts
//
// Balances live in the store as integer minor units (hundredths) so the
// conditional UPDATE is exact integer arithmetic. Decimal is used at every
// other boundary.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

/// Number of fractional digits an amount may carry.
pub const SCALE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("amount supports at most {} decimal places", SCALE)]
    TooPrecise,
    #[error("amount is too large")]
    OutOfRange,
}

/// A validated, strictly positive amount for a balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount {
    minor_units: i64,
}

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive);
        }
        let minor_units = to_minor_units(value)?;
        Ok(Self { minor_units })
    }

    pub fn minor_units(&self) -> i64 {
        self.minor_units
    }

    pub fn value(&self) -> Decimal {
        from_minor_units(self.minor_units)
    }
}

/// Convert a decimal into hundredths, rejecting extra precision.
pub fn to_minor_units(value: Decimal) -> Result<i64, AmountError> {
    let normalized = value.normalize();
    if normalized.scale() > SCALE {
        return Err(AmountError::TooPrecise);
    }
    normalized
        .checked_mul(Decimal::from(10_i64.pow(SCALE)))
        .and_then(|scaled| scaled.to_i64())
        .ok_or(AmountError::OutOfRange)
}

pub fn from_minor_units(units: i64) -> Decimal {
    Decimal::new(units, SCALE)
}
