use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;

/// cash amounts are charged in whole coin steps
#[derive(Debug, Clone, Copy)]
pub struct CashRounding {
    step: Decimal,
}

/// result of rounding a cash amount
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundedCash {
    pub exact: Money,
    pub charged: Money,
    /// `charged - exact`, signed
    pub adjustment: Money,
}

impl CashRounding {
    pub fn new(step: Decimal) -> Self {
        Self { step }
    }

    /// round to the nearest step, halves away from zero
    pub fn apply(&self, exact: Money) -> RoundedCash {
        let charged = exact.round_to_step(self.step);
        RoundedCash {
            exact,
            charged,
            adjustment: charged - exact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_nearest_ten_cents() {
        let rounding = CashRounding::new(dec!(0.10));

        let down = rounding.apply(Money::from_minor(833));
        assert_eq!(down.charged, Money::from_minor(830));
        assert_eq!(down.adjustment, Money::from_minor(-3));

        let up = rounding.apply(Money::from_minor(8_847));
        assert_eq!(up.charged, Money::from_minor(8_850));
        assert_eq!(up.adjustment, Money::from_minor(3));

        let half = rounding.apply(Money::from_minor(1_005));
        assert_eq!(half.charged, Money::from_minor(1_010));

        let exact = rounding.apply(Money::from_major(30));
        assert_eq!(exact.charged, Money::from_major(30));
        assert!(exact.adjustment.is_zero());
    }
}
