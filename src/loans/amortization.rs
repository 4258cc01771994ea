use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};
use crate::interest::monthly_effective_rate;

/// one row of a fixed-installment (french) schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledInstallment {
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub beginning_balance: Money,
    pub installment_amount: Money,
    pub interest_portion: Money,
    pub principal_portion: Money,
    pub ending_balance: Money,
}

/// amortization schedule
#[derive(Debug, Clone)]
pub struct AmortizationSchedule {
    pub capital: Money,
    pub annual_rate: Rate,
    pub monthly_rate: Rate,
    pub installment_amount: Money,
    pub start_date: NaiveDate,
    pub installments: Vec<ScheduledInstallment>,
    pub total_interest: Money,
    pub total_due: Money,
}

impl AmortizationSchedule {
    /// generate a schedule of `count` equal installments due every `spacing_days`
    pub fn generate(
        capital: Money,
        annual_rate: Rate,
        count: u32,
        start_date: NaiveDate,
        spacing_days: u32,
    ) -> Result<Self> {
        if !capital.is_positive() {
            return Err(LendingError::InvalidAmount { amount: capital });
        }
        if count == 0 {
            return Err(LendingError::InstallmentCeilingExceeded {
                ceiling: 0,
                requested: count,
            });
        }

        let monthly_rate = monthly_effective_rate(annual_rate)?;
        let installment_amount = installment_amount(capital, monthly_rate, count);
        let i = monthly_rate.as_decimal();

        let mut installments = Vec::with_capacity(count as usize);
        let mut balance = capital;

        for sequence in 1..=count {
            let beginning_balance = balance;
            let interest = balance * i;
            // every row splits the same installment; only the running balance is floored
            let principal = installment_amount - interest;
            balance = balance.saturating_sub(principal);

            installments.push(ScheduledInstallment {
                sequence,
                due_date: start_date + Duration::days(i64::from(sequence) * i64::from(spacing_days)),
                beginning_balance,
                installment_amount,
                interest_portion: interest,
                principal_portion: principal,
                ending_balance: balance,
            });
        }

        let total_interest = installments.iter().map(|row| row.interest_portion).sum();
        let total_due = installment_amount * Decimal::from(count);

        Ok(Self {
            capital,
            annual_rate,
            monthly_rate,
            installment_amount,
            start_date,
            installments,
            total_interest,
            total_due,
        })
    }

    pub fn get(&self, sequence: u32) -> Option<&ScheduledInstallment> {
        sequence
            .checked_sub(1)
            .and_then(|index| self.installments.get(index as usize))
    }

    pub fn total_principal(&self) -> Money {
        self.installments.iter().map(|row| row.principal_portion).sum()
    }
}

/// fixed installment: `capital * i(1+i)^n / ((1+i)^n - 1)`, or `capital / n` when `i` is zero
pub fn installment_amount(capital: Money, monthly_rate: Rate, count: u32) -> Money {
    if count == 0 {
        return capital;
    }

    let r = monthly_rate.as_decimal();
    if r.is_zero() {
        return capital / Decimal::from(count);
    }

    let mut compound = Decimal::ONE;
    let base = Decimal::ONE + r;
    for _ in 0..count {
        compound *= base;
    }

    let numerator = capital.as_decimal() * r * compound;
    let denominator = compound - Decimal::ONE;

    Money::from_decimal(numerator / denominator)
}
