pub mod penalty;

use rust_decimal::{Decimal, MathematicalOps};

use crate::decimal::Rate;
use crate::errors::{LendingError, Result};

pub use penalty::{MoraAssessment, MoraCalculator};

/// convert an annual effective rate (TEA) into the equivalent monthly effective rate (TEM)
///
/// `(1 + annual)^(1/12) - 1`, so twelve compounded months reproduce the annual rate.
pub fn monthly_effective_rate(annual: Rate) -> Result<Rate> {
    if annual.is_negative() {
        return Err(LendingError::InvalidInterestRate { rate: annual });
    }
    if annual.is_zero() {
        return Ok(Rate::ZERO);
    }

    let twelfth = Decimal::ONE / Decimal::from(12);
    let factor = (Decimal::ONE + annual.as_decimal())
        .checked_powd(twelfth)
        .ok_or(LendingError::InvalidInterestRate { rate: annual })?;

    Ok(Rate::from_decimal(factor - Decimal::ONE))
}

/// compound a monthly rate back into its annual equivalent
pub fn annual_effective_rate(monthly: Rate) -> Rate {
    let mut factor = Decimal::ONE;
    for _ in 0..12 {
        factor *= Decimal::ONE + monthly.as_decimal();
    }
    Rate::from_decimal(factor - Decimal::ONE)
}
