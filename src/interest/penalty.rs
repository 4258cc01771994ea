use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::MoraConfig;
use crate::decimal::Money;
use crate::errors::{LendingError, Result};

/// late-payment penalty (mora) calculator
///
/// Lateness is counted in whole days and converted to started months; the
/// monthly rate is compounded once per started month on the outstanding
/// balance. The calculator reads no clock: "today" is always an argument.
#[derive(Debug, Clone)]
pub struct MoraCalculator {
    config: MoraConfig,
}

impl MoraCalculator {
    pub fn new(config: MoraConfig) -> Self {
        Self { config }
    }

    /// whole days past the due date, never negative
    pub fn days_late(due_date: NaiveDate, today: NaiveDate) -> u32 {
        (today - due_date).num_days().max(0) as u32
    }

    /// started months of lateness: ceil(days / days_per_month), at least 1 once late
    pub fn months_late(&self, days_late: u32) -> u32 {
        if days_late == 0 {
            return 0;
        }
        let per_month = self.config.days_per_month.max(1);
        days_late.div_ceil(per_month).max(1)
    }

    /// penalty owed on `balance` for an installment due on `due_date`
    pub fn assess(&self, balance: Money, due_date: NaiveDate, today: NaiveDate) -> Result<MoraAssessment> {
        let days_late = Self::days_late(due_date, today);
        let months_late = self.months_late(days_late);

        let penalty = if months_late == 0 || !balance.is_positive() {
            Money::ZERO
        } else {
            balance
                .checked_compound_growth(self.config.monthly_rate, months_late)
                .ok_or(LendingError::PenaltyOverflow { days_late })?
        };

        Ok(MoraAssessment {
            balance,
            days_late,
            months_late,
            penalty,
        })
    }
}

/// mora assessment for one installment on one day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoraAssessment {
    pub balance: Money,
    pub days_late: u32,
    pub months_late: u32,
    pub penalty: Money,
}

impl MoraAssessment {
    pub fn is_late(&self) -> bool {
        self.days_late > 0
    }

    /// balance plus penalty
    pub fn total_due(&self) -> Money {
        self.balance + self.penalty
    }
}
