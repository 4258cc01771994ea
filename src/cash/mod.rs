pub mod drawer;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{MovementDirection, MovementId, PaymentId, ShiftId};

pub use drawer::{MovementRequest, ShiftSummary};

/// one cashier shift on the physical drawer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashShift {
    pub id: ShiftId,
    /// calendar day the shift was opened on; one shift per day
    pub business_date: NaiveDate,
    pub opening_float: Money,
    pub opened_at: DateTime<Utc>,
    /// system-expected drawer total, kept current as movements are recorded
    pub expected_total: Money,
    pub closed: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub counted_cash: Option<Money>,
    pub variance: Option<Money>,
}

impl CashShift {
    pub fn is_open(&self) -> bool {
        !self.closed
    }
}

/// append-only record of cash entering or leaving the drawer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashMovement {
    pub id: MovementId,
    pub shift_id: ShiftId,
    /// position within the shift
    pub sequence: u32,
    pub direction: MovementDirection,
    pub amount: Money,
    pub reason: String,
    pub payment_id: Option<PaymentId>,
    pub recorded_at: DateTime<Utc>,
}

impl CashMovement {
    /// amount with its direction applied
    pub fn signed_amount(&self) -> Money {
        match self.direction {
            MovementDirection::In => self.amount,
            MovementDirection::Out => -self.amount,
        }
    }
}
