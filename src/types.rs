use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;

pub type LoanId = Uuid;
pub type InstallmentId = Uuid;
pub type PaymentId = Uuid;
pub type ClientId = Uuid;
pub type ShiftId = Uuid;
pub type MovementId = Uuid;

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// at least one installment still owes money
    Pending,
    /// fully paid off
    Settled,
}

/// how money reached the business
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentChannel {
    /// notes and coins at the counter; `received` is what was handed over
    Cash { received: Money },
    /// confirmed by the external payment gateway
    Gateway { token: String },
}

impl PaymentChannel {
    pub fn kind(&self) -> ChannelKind {
        match self {
            PaymentChannel::Cash { .. } => ChannelKind::Cash,
            PaymentChannel::Gateway { .. } => ChannelKind::Gateway,
        }
    }

    pub fn gateway_token(&self) -> Option<&str> {
        match self {
            PaymentChannel::Gateway { token } => Some(token),
            PaymentChannel::Cash { .. } => None,
        }
    }
}

/// payment channel without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelKind {
    Cash,
    Gateway,
}

/// payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Approved,
    Voided,
}

/// cash movement direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementDirection {
    In,
    Out,
}

/// how a credited amount was split for one installment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PaymentBreakdown {
    pub to_penalty: Money,
    pub to_principal: Money,
    /// part of the credited amount that had nothing left to retire
    pub excess: Money,
}

impl PaymentBreakdown {
    pub fn total_applied(&self) -> Money {
        self.to_penalty + self.to_principal
    }
}
