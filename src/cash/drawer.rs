use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::events::Event;
use crate::store::Ledger;
use crate::types::{ChannelKind, MovementDirection, PaymentId, ShiftId};

use super::{CashMovement, CashShift};

/// cash to add to or take from the open drawer
#[derive(Debug, Clone, PartialEq)]
pub struct MovementRequest {
    pub direction: MovementDirection,
    pub amount: Money,
    pub reason: String,
    pub payment_id: Option<PaymentId>,
}

impl MovementRequest {
    /// manual movement not tied to a payment
    pub fn manual(direction: MovementDirection, amount: Money, reason: impl Into<String>) -> Self {
        Self {
            direction,
            amount,
            reason: reason.into(),
            payment_id: None,
        }
    }
}

/// totals of one shift for the closing report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftSummary {
    pub shift_id: ShiftId,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub opening_float: Money,
    pub cash_in: Money,
    pub cash_out: Money,
    pub expected_balance: Money,
    /// amount credited on cash payments
    pub cash_credited: Money,
    /// gateway payments settled during the shift; never in the drawer
    pub banked: Money,
    pub payment_count: u32,
    pub rounding_adjustments: Money,
    pub counted_cash: Option<Money>,
    pub variance: Option<Money>,
}

/// open a shift with the float placed in the drawer
pub fn open_shift(ledger: &mut Ledger, opening_float: Money, now: DateTime<Utc>) -> Result<CashShift> {
    if opening_float.is_negative() {
        return Err(LendingError::InvalidAmount { amount: opening_float });
    }
    if ledger.active_shift().is_some() {
        return Err(LendingError::ShiftAlreadyOpen);
    }

    let today = now.date_naive();
    if ledger.shifts.values().any(|s| s.business_date == today) {
        return Err(LendingError::ShiftAlreadyOpenedToday { date: today });
    }

    let shift = CashShift {
        id: Uuid::new_v4(),
        business_date: today,
        opening_float,
        opened_at: now,
        expected_total: opening_float,
        closed: false,
        closed_at: None,
        counted_cash: None,
        variance: None,
    };

    ledger.events.emit(Event::ShiftOpened {
        shift_id: shift.id,
        opening_float,
        timestamp: now,
    });
    ledger.shifts.insert(shift.id, shift.clone());

    tracing::info!(shift_id = %shift.id, opening_float = %opening_float, "cash shift opened");
    Ok(shift)
}

/// opening float plus every movement of the shift, signed
pub fn shift_balance(ledger: &Ledger, shift_id: ShiftId) -> Money {
    let float = ledger
        .shift(shift_id)
        .map(|s| s.opening_float)
        .unwrap_or(Money::ZERO);
    let movements: Money = ledger
        .movements_for_shift(shift_id)
        .iter()
        .map(|m| m.signed_amount())
        .sum();
    float + movements
}

/// expected balance of the open drawer
pub fn current_balance(ledger: &Ledger) -> Result<Money> {
    let shift = ledger.active_shift().ok_or(LendingError::NoOpenShift)?;
    Ok(shift_balance(ledger, shift.id))
}

/// append a movement to the open shift
pub fn record_movement(ledger: &mut Ledger, request: MovementRequest, now: DateTime<Utc>) -> Result<CashMovement> {
    if !request.amount.is_positive() {
        return Err(LendingError::InvalidAmount { amount: request.amount });
    }

    let shift_id = ledger.active_shift().ok_or(LendingError::NoOpenShift)?.id;
    let balance = shift_balance(ledger, shift_id);

    if request.direction == MovementDirection::Out && request.amount > balance {
        return Err(LendingError::InsufficientDrawerFunds {
            available: balance,
            change_due: request.amount,
        });
    }

    let movement = CashMovement {
        id: Uuid::new_v4(),
        shift_id,
        sequence: ledger.movements_for_shift(shift_id).len() as u32 + 1,
        direction: request.direction,
        amount: request.amount,
        reason: request.reason,
        payment_id: request.payment_id,
        recorded_at: now,
    };

    if let Some(shift) = ledger.active_shift_mut() {
        shift.expected_total = balance + movement.signed_amount();
    }

    ledger.events.emit(Event::CashMovementRecorded {
        shift_id,
        direction: movement.direction,
        amount: movement.amount,
        reason: movement.reason.clone(),
        timestamp: now,
    });
    ledger.movements.insert(movement.id, movement.clone());

    tracing::debug!(
        shift_id = %shift_id,
        direction = ?movement.direction,
        amount = %movement.amount,
        "cash movement recorded"
    );
    Ok(movement)
}

/// close the open shift against a physical count
///
/// Refuses to close unless the count matches the expected balance to the
/// cent; the shift stays open so a corrective movement can be recorded.
pub fn close_shift(ledger: &mut Ledger, counted_cash: Money, now: DateTime<Utc>) -> Result<CashShift> {
    if counted_cash.is_negative() {
        return Err(LendingError::InvalidAmount { amount: counted_cash });
    }

    let shift_id = ledger.active_shift().ok_or(LendingError::NoOpenShift)?.id;
    let expected = shift_balance(ledger, shift_id);
    let variance = counted_cash - expected;

    if !variance.is_zero() {
        tracing::warn!(
            shift_id = %shift_id,
            expected = %expected,
            counted = %counted_cash,
            variance = %variance,
            "drawer does not reconcile, shift left open"
        );
        return Err(LendingError::ReconciliationMismatch {
            expected,
            counted: counted_cash,
            variance,
        });
    }

    let shift = ledger.active_shift_mut().ok_or(LendingError::NoOpenShift)?;
    shift.closed = true;
    shift.closed_at = Some(now);
    shift.counted_cash = Some(counted_cash);
    shift.variance = Some(variance);
    shift.expected_total = expected;
    let closed = shift.clone();

    ledger.events.emit(Event::ShiftClosed {
        shift_id,
        expected,
        counted: counted_cash,
        timestamp: now,
    });

    tracing::info!(shift_id = %shift_id, counted = %counted_cash, "cash shift closed");
    Ok(closed)
}

/// report for a shift, open or closed
pub fn summarize_shift(ledger: &Ledger, shift_id: ShiftId, now: DateTime<Utc>) -> Result<ShiftSummary> {
    let shift = ledger
        .shift(shift_id)
        .ok_or(LendingError::ShiftNotFound { id: shift_id })?;

    let movements = ledger.movements_for_shift(shift_id);
    let total = |direction: MovementDirection| -> Money {
        movements
            .iter()
            .filter(|m| m.direction == direction)
            .map(|m| m.amount)
            .sum()
    };

    let window_end = shift.closed_at.unwrap_or(now);
    let payments = ledger.approved_payments_between(shift.opened_at, Some(window_end));
    let cash_payments: Vec<_> = payments
        .iter()
        .filter(|p| p.channel == ChannelKind::Cash && p.shift_id == Some(shift_id))
        .collect();
    let gateway_payments: Vec<_> = payments
        .iter()
        .filter(|p| p.channel == ChannelKind::Gateway)
        .collect();

    Ok(ShiftSummary {
        shift_id,
        opened_at: shift.opened_at,
        closed_at: shift.closed_at,
        opening_float: shift.opening_float,
        cash_in: total(MovementDirection::In),
        cash_out: total(MovementDirection::Out),
        expected_balance: shift_balance(ledger, shift_id),
        cash_credited: cash_payments.iter().map(|p| p.credited).sum(),
        banked: gateway_payments.iter().map(|p| p.credited).sum(),
        payment_count: (cash_payments.len() + gateway_payments.len()) as u32,
        rounding_adjustments: cash_payments.iter().map(|p| p.rounding_adjustment).sum(),
        counted_cash: shift.counted_cash,
        variance: shift.variance,
    })
}

/// every shift, newest first
pub fn shift_history(ledger: &Ledger) -> Vec<CashShift> {
    let mut shifts: Vec<CashShift> = ledger.shifts.values().cloned().collect();
    shifts.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
    shifts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_drawer_reconciliation() {
        let mut ledger = Ledger::new();
        open_shift(&mut ledger, Money::from_major(100), morning()).unwrap();

        record_movement(
            &mut ledger,
            MovementRequest::manual(MovementDirection::In, Money::from_major(50), "tendered"),
            morning(),
        )
        .unwrap();
        record_movement(
            &mut ledger,
            MovementRequest::manual(MovementDirection::Out, Money::from_major(20), "change"),
            morning(),
        )
        .unwrap();

        assert_eq!(current_balance(&ledger).unwrap(), Money::from_major(130));
        assert_eq!(ledger.active_shift().unwrap().expected_total, Money::from_major(130));

        let err = close_shift(&mut ledger, Money::from_major(125), morning()).unwrap_err();
        assert_eq!(
            err,
            LendingError::ReconciliationMismatch {
                expected: Money::from_major(130),
                counted: Money::from_major(125),
                variance: Money::from_major(-5),
            }
        );
        assert!(ledger.active_shift().is_some());

        let closed = close_shift(&mut ledger, Money::from_major(130), morning()).unwrap();
        assert!(closed.closed);
        assert_eq!(closed.variance, Some(Money::ZERO));
        assert!(ledger.active_shift().is_none());
    }

    #[test]
    fn test_corrective_movement_allows_close() {
        let mut ledger = Ledger::new();
        open_shift(&mut ledger, Money::from_major(100), morning()).unwrap();

        assert!(close_shift(&mut ledger, Money::from_major(95), morning()).is_err());
        record_movement(
            &mut ledger,
            MovementRequest::manual(MovementDirection::Out, Money::from_major(5), "shortage"),
            morning(),
        )
        .unwrap();
        assert!(close_shift(&mut ledger, Money::from_major(95), morning()).is_ok());
    }

    #[test]
    fn test_one_shift_at_a_time_and_per_day() {
        let mut ledger = Ledger::new();
        open_shift(&mut ledger, Money::from_major(50), morning()).unwrap();

        assert_eq!(
            open_shift(&mut ledger, Money::from_major(50), morning()).unwrap_err(),
            LendingError::ShiftAlreadyOpen
        );

        close_shift(&mut ledger, Money::from_major(50), morning()).unwrap();
        let evening = morning() + Duration::hours(10);
        assert_eq!(
            open_shift(&mut ledger, Money::from_major(50), evening).unwrap_err(),
            LendingError::ShiftAlreadyOpenedToday {
                date: morning().date_naive()
            }
        );

        let tomorrow = morning() + Duration::days(1);
        assert!(open_shift(&mut ledger, Money::from_major(50), tomorrow).is_ok());
        assert_eq!(shift_history(&ledger)[0].opened_at, tomorrow);
    }

    #[test]
    fn test_movements_need_open_shift() {
        let mut ledger = Ledger::new();
        let err = record_movement(
            &mut ledger,
            MovementRequest::manual(MovementDirection::In, Money::from_major(10), "injection"),
            morning(),
        )
        .unwrap_err();
        assert_eq!(err, LendingError::NoOpenShift);
        assert_eq!(current_balance(&ledger).unwrap_err(), LendingError::NoOpenShift);
        assert_eq!(
            close_shift(&mut ledger, Money::ZERO, morning()).unwrap_err(),
            LendingError::NoOpenShift
        );
    }

    #[test]
    fn test_cannot_pay_out_more_than_drawer_holds() {
        let mut ledger = Ledger::new();
        open_shift(&mut ledger, Money::from_major(20), morning()).unwrap();

        let err = record_movement(
            &mut ledger,
            MovementRequest::manual(MovementDirection::Out, Money::from_major(25), "withdrawal"),
            morning(),
        )
        .unwrap_err();
        assert!(matches!(err, LendingError::InsufficientDrawerFunds { .. }));

        let err = record_movement(
            &mut ledger,
            MovementRequest::manual(MovementDirection::In, Money::ZERO, "nothing"),
            morning(),
        )
        .unwrap_err();
        assert!(matches!(err, LendingError::InvalidAmount { .. }));
    }

    #[test]
    fn test_summary_of_empty_shift() {
        let mut ledger = Ledger::new();
        let shift = open_shift(&mut ledger, Money::from_major(80), morning()).unwrap();

        let summary = summarize_shift(&ledger, shift.id, morning()).unwrap();
        assert_eq!(summary.opening_float, Money::from_major(80));
        assert_eq!(summary.expected_balance, Money::from_major(80));
        assert_eq!(summary.payment_count, 0);
        assert!(summary.banked.is_zero());
    }
}
