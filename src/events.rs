use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    ChannelKind, ClientId, InstallmentId, LoanId, MovementDirection, PaymentId, ShiftId,
};

/// all events emitted by the settlement core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // registry events
    ClientRegistered {
        client_id: ClientId,
        document: String,
        timestamp: DateTime<Utc>,
    },

    // loan lifecycle events
    LoanIssued {
        loan_id: LoanId,
        client_id: ClientId,
        capital: Money,
        installment_amount: Money,
        installments: u32,
        timestamp: DateTime<Utc>,
    },
    InstallmentScheduled {
        loan_id: LoanId,
        installment_id: InstallmentId,
        sequence: u32,
        due_date: NaiveDate,
        amount: Money,
    },
    LoanSettled {
        loan_id: LoanId,
        total_paid: Money,
        timestamp: DateTime<Utc>,
    },
    LoanReopened {
        loan_id: LoanId,
        outstanding: Money,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentApplied {
        payment_id: PaymentId,
        loan_id: LoanId,
        installment_id: InstallmentId,
        channel: ChannelKind,
        credited: Money,
        to_principal: Money,
        to_penalty: Money,
        remaining_balance: Money,
        timestamp: DateTime<Utc>,
    },
    PenaltyWaived {
        installment_id: InstallmentId,
        waived: Money,
        timestamp: DateTime<Utc>,
    },
    ResidualForgiven {
        installment_id: InstallmentId,
        amount: Money,
        timestamp: DateTime<Utc>,
    },
    PaymentVoided {
        payment_id: PaymentId,
        installment_id: InstallmentId,
        restored: Money,
        voided_by: String,
        timestamp: DateTime<Utc>,
    },

    // drawer events
    ShiftOpened {
        shift_id: ShiftId,
        opening_float: Money,
        timestamp: DateTime<Utc>,
    },
    CashMovementRecorded {
        shift_id: ShiftId,
        direction: MovementDirection,
        amount: Money,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    ShiftClosed {
        shift_id: ShiftId,
        expected: Money,
        counted: Money,
        timestamp: DateTime<Utc>,
    },

    // gateway events
    GatewayTokenParked {
        token: String,
        attempts: u32,
        /// none once automatic retries are exhausted
        next_attempt_at: Option<DateTime<Utc>>,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    GatewayPaymentNotApproved {
        token: String,
        timestamp: DateTime<Utc>,
    },
    GatewayPaymentHeld {
        token: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
