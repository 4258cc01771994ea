use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::decimal::{Money, Rate};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LendingError {
    #[error("invalid amount: {amount}")]
    InvalidAmount {
        amount: Money,
    },

    #[error("capital {requested} exceeds ceiling {ceiling}")]
    CapitalCeilingExceeded {
        ceiling: Money,
        requested: Money,
    },

    #[error("installment count {requested} outside 1..={ceiling}")]
    InstallmentCeilingExceeded {
        ceiling: u32,
        requested: u32,
    },

    #[error("invalid interest rate: {rate}")]
    InvalidInterestRate {
        rate: Rate,
    },

    #[error("client {client_id} already holds unsettled loan {loan_id}")]
    ActiveLoanExists {
        client_id: Uuid,
        loan_id: Uuid,
    },

    #[error("client not found: {id}")]
    ClientNotFound {
        id: Uuid,
    },

    #[error("client already registered with document {document}")]
    DuplicateClient {
        document: String,
    },

    #[error("loan not found: {id}")]
    LoanNotFound {
        id: Uuid,
    },

    #[error("installment not found: {id}")]
    InstallmentNotFound {
        id: Uuid,
    },

    #[error("payment not found: {id}")]
    PaymentNotFound {
        id: Uuid,
    },

    #[error("installment {number} is already paid")]
    InstallmentAlreadyPaid {
        number: u32,
    },

    #[error("payment {id} is already voided")]
    PaymentAlreadyVoided {
        id: Uuid,
    },

    #[error("cash handed over {received} is less than amount charged {charged}")]
    InsufficientTender {
        charged: Money,
        received: Money,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("identity lookup failed: {message}")]
    IdentityLookupFailed {
        message: String,
    },

    #[error("installments must be paid in order: installment {blocking} is unpaid, cannot pay {requested}")]
    SequenceViolation {
        requested: u32,
        blocking: u32,
    },

    #[error("drawer holds {available}, cannot return change of {change_due}")]
    InsufficientDrawerFunds {
        available: Money,
        change_due: Money,
    },

    #[error("drawer does not reconcile: expected {expected}, counted {counted}, variance {variance}")]
    ReconciliationMismatch {
        expected: Money,
        counted: Money,
        variance: Money,
    },

    #[error("a cash shift is already open")]
    ShiftAlreadyOpen,

    #[error("a cash shift was already opened on {date}")]
    ShiftAlreadyOpenedToday {
        date: NaiveDate,
    },

    #[error("no cash shift is open")]
    NoOpenShift,

    #[error("penalty after {days_late} days late does not fit in a decimal")]
    PenaltyOverflow {
        days_late: u32,
    },

    #[error("cash shift not found: {id}")]
    ShiftNotFound {
        id: Uuid,
    },

    #[error("gateway query for token {token} failed: {message}")]
    GatewayTransient {
        token: String,
        message: String,
    },

    #[error("gateway refused request: {message}")]
    GatewayRejected {
        message: String,
    },

    #[error("{collaborator} failed: {message}")]
    CollaboratorFailed {
        collaborator: String,
        message: String,
    },

    #[error("store unavailable: {message}")]
    StoreUnavailable {
        message: String,
    },
}

impl LendingError {
    /// bad input shape or limits; the caller must change the request
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LendingError::InvalidAmount { .. }
                | LendingError::CapitalCeilingExceeded { .. }
                | LendingError::InstallmentCeilingExceeded { .. }
                | LendingError::InvalidInterestRate { .. }
                | LendingError::ActiveLoanExists { .. }
                | LendingError::ClientNotFound { .. }
                | LendingError::DuplicateClient { .. }
                | LendingError::LoanNotFound { .. }
                | LendingError::InstallmentNotFound { .. }
                | LendingError::PaymentNotFound { .. }
                | LendingError::ShiftNotFound { .. }
                | LendingError::InstallmentAlreadyPaid { .. }
                | LendingError::PaymentAlreadyVoided { .. }
                | LendingError::InsufficientTender { .. }
                | LendingError::InvalidConfiguration { .. }
                | LendingError::IdentityLookupFailed { .. }
        )
    }

    /// worth trying again later without changing the request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LendingError::GatewayTransient { .. } | LendingError::StoreUnavailable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LendingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = LendingError::CapitalCeilingExceeded {
            ceiling: Money::from_major(20_000),
            requested: Money::from_major(25_000),
        };
        assert!(err.is_validation());
        assert!(!err.is_retryable());

        let err = LendingError::SequenceViolation { requested: 3, blocking: 2 };
        assert!(!err.is_validation());
        assert_eq!(
            err.to_string(),
            "installments must be paid in order: installment 2 is unpaid, cannot pay 3"
        );

        let err = LendingError::GatewayTransient {
            token: "tok".to_string(),
            message: "timeout".to_string(),
        };
        assert!(err.is_retryable());
    }
}
