use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};

/// back office configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LendingConfig {
    pub limits: LoanLimits,
    pub mora: MoraConfig,
    pub tolerances: SettlementTolerances,
    pub drawer: DrawerPolicy,
    pub gateway_retry: GatewayRetryPolicy,
}

/// ceilings applied when a loan is issued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanLimits {
    pub max_capital: Money,
    pub max_installments: u32,
    /// days between consecutive due dates
    pub installment_spacing_days: u32,
}

impl Default for LoanLimits {
    fn default() -> Self {
        Self {
            max_capital: Money::from_major(20_000),
            max_installments: 24,
            installment_spacing_days: 30,
        }
    }
}

/// late-payment penalty terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoraConfig {
    /// compounded once per started month of lateness
    pub monthly_rate: Rate,
    pub days_per_month: u32,
}

impl Default for MoraConfig {
    fn default() -> Self {
        Self {
            monthly_rate: Rate::from_percentage(1),
            days_per_month: 30,
        }
    }
}

/// rounding and forgiveness thresholds used by settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementTolerances {
    /// shortfall still accepted as paying balance plus penalty in full
    pub full_settlement: Money,
    /// an installment at or below this balance counts as paid
    pub paid_threshold: Money,
    /// residual forgiven after a cash payment
    pub cash_forgiveness: Money,
    /// a loan at or below this outstanding total counts as settled
    pub loan_settled: Money,
    /// cash amounts are charged in multiples of this step
    pub cash_rounding_step: Decimal,
}

impl Default for SettlementTolerances {
    fn default() -> Self {
        Self {
            full_settlement: Money::from_minor(50),
            paid_threshold: Money::from_minor(50),
            cash_forgiveness: Money::ONE,
            loan_settled: Money::from_minor(50),
            cash_rounding_step: dec!(0.10),
        }
    }
}

/// which drawer balance must cover the change owed to a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ChangeFundsCheck {
    /// the drawer as it stood before the client handed anything over
    #[default]
    PreTransaction,
    /// the drawer including the notes the client just handed over
    IncludingTendered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DrawerPolicy {
    pub change_check: ChangeFundsCheck,
}

/// re-query schedule for gateway tokens whose status could not be read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayRetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_secs: i64,
    pub max_backoff_secs: i64,
}

impl Default for GatewayRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_secs: 60,
            max_backoff_secs: 3_600,
        }
    }
}

impl GatewayRetryPolicy {
    /// delay before the next query after `attempts` failures (doubling, capped)
    pub fn backoff_after(&self, attempts: u32) -> chrono::Duration {
        let exponent = attempts.saturating_sub(1).min(30);
        let secs = self
            .base_backoff_secs
            .saturating_mul(1_i64 << exponent)
            .min(self.max_backoff_secs);
        chrono::Duration::seconds(secs)
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl LendingConfig {
    /// parse configuration from json; missing sections fall back to defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LendingConfig =
            serde_json::from_str(json).map_err(|e| LendingError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LendingError::InvalidConfiguration {
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.limits.max_capital.is_positive() {
            return Err(invalid("max_capital must be positive"));
        }
        if self.limits.max_installments == 0 {
            return Err(invalid("max_installments must be at least 1"));
        }
        if self.limits.installment_spacing_days == 0 {
            return Err(invalid("installment_spacing_days must be at least 1"));
        }
        if self.mora.monthly_rate.is_negative() {
            return Err(invalid("mora monthly_rate cannot be negative"));
        }
        if self.mora.days_per_month == 0 {
            return Err(invalid("mora days_per_month must be at least 1"));
        }

        let t = &self.tolerances;
        if [t.full_settlement, t.paid_threshold, t.cash_forgiveness, t.loan_settled]
            .iter()
            .any(Money::is_negative)
        {
            return Err(invalid("tolerances cannot be negative"));
        }
        if t.cash_rounding_step < Decimal::ZERO {
            return Err(invalid("cash_rounding_step cannot be negative"));
        }

        let r = &self.gateway_retry;
        if r.max_attempts == 0 || r.base_backoff_secs <= 0 || r.max_backoff_secs < r.base_backoff_secs {
            return Err(invalid("gateway retry policy is inconsistent"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> LendingError {
    LendingError::InvalidConfiguration {
        message: message.to_string(),
    }
}
