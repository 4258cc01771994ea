pub mod distribution;
pub mod reversal;
pub mod rounding;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::loans::{Installment, LoanSummary};
use crate::types::{
    ChannelKind, ClientId, InstallmentId, LoanId, PaymentBreakdown, PaymentChannel, PaymentId,
    PaymentStatus, ShiftId,
};

pub use distribution::{allocate, Allocation, PaymentDistributor};
pub use reversal::{void_payment, VoidOutcome};
pub use rounding::{CashRounding, RoundedCash};

/// a settled payment against one installment
///
/// Immutable once written apart from the void fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub loan_id: LoanId,
    pub installment_id: InstallmentId,
    pub client_id: ClientId,
    pub channel: ChannelKind,
    /// unique when present
    pub gateway_token: Option<String>,
    /// cash payments carry the shift their movements were recorded in
    pub shift_id: Option<ShiftId>,

    /// amount officially credited
    pub credited: Money,
    /// amount physically handed over (cash) or reported by the gateway
    pub received: Money,
    /// credited minus the exact amount asked for (cash rounding)
    pub rounding_adjustment: Money,
    pub change_given: Money,

    pub breakdown: PaymentBreakdown,
    /// penalty assessed at payment time; waived when not in the breakdown
    pub penalty_assessed: Money,
    pub days_late: u32,
    /// residual balance written off after the allocation
    pub forgiven: Money,
    pub balance_before: Money,
    pub balance_after: Money,

    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub voided_by: Option<String>,
    pub voided_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn is_voided(&self) -> bool {
        self.status == PaymentStatus::Voided
    }

    /// how much this payment took off the installment balance
    pub fn balance_retired(&self) -> Money {
        self.balance_before.saturating_sub(self.balance_after)
    }

    pub fn penalty_waived(&self) -> Money {
        self.penalty_assessed.saturating_sub(self.breakdown.to_penalty)
    }
}

/// payment to apply against one installment
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub installment_id: InstallmentId,
    /// amount the client is paying, before cash rounding
    pub amount: Money,
    pub channel: PaymentChannel,
}

impl PaymentRequest {
    pub fn cash(installment_id: InstallmentId, amount: Money, received: Money) -> Self {
        Self {
            installment_id,
            amount,
            channel: PaymentChannel::Cash { received },
        }
    }

    pub fn gateway(installment_id: InstallmentId, amount: Money, token: impl Into<String>) -> Self {
        Self {
            installment_id,
            amount,
            channel: PaymentChannel::Gateway { token: token.into() },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_positive() {
            return Err(LendingError::InvalidAmount { amount: self.amount });
        }
        if let PaymentChannel::Cash { received } = &self.channel {
            if received.is_negative() {
                return Err(LendingError::InvalidAmount { amount: *received });
            }
        }
        if let PaymentChannel::Gateway { token } = &self.channel {
            if token.trim().is_empty() {
                return Err(LendingError::GatewayRejected {
                    message: "empty gateway token".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// everything a payment changed, returned to the caller after commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub installment: Installment,
    pub loan: LoanSummary,
    pub change_due: Money,
}
