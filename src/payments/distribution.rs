use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cash::drawer::{self, MovementRequest};
use crate::config::{ChangeFundsCheck, DrawerPolicy, LendingConfig, SettlementTolerances};
use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::events::Event;
use crate::interest::{MoraAssessment, MoraCalculator};
use crate::loans::{ensure_in_sequence, LoanAggregator};
use crate::store::Ledger;
use crate::types::{ChannelKind, InstallmentId, MovementDirection, PaymentBreakdown, PaymentChannel, PaymentStatus};

use super::{CashRounding, Payment, PaymentOutcome, PaymentRequest};

/// how one credited amount lands on one installment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub breakdown: PaymentBreakdown,
    pub penalty_assessed: Money,
    pub penalty_waived: Money,
    /// residual written off to close the installment
    pub forgiven: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub paid: bool,
    /// credited amount covered balance plus penalty (within tolerance)
    pub full_settlement: bool,
}

/// split `credited` between penalty and principal
///
/// Full settlement charges the whole penalty and retires the balance with the
/// rest. Anything short of that waives the penalty outright and puts every
/// unit on principal, capped at the balance. Afterwards a residual at or below
/// the paid threshold is written off; cash payments write off residuals up to
/// the larger cash forgiveness limit.
pub fn allocate(
    balance: Money,
    penalty: Money,
    credited: Money,
    channel: ChannelKind,
    tolerances: &SettlementTolerances,
) -> Allocation {
    let full_settlement = credited >= (balance + penalty) - tolerances.full_settlement;

    let (to_penalty, to_principal) = if full_settlement {
        let to_penalty = penalty.min(credited);
        (to_penalty, (credited - to_penalty).min(balance))
    } else {
        (Money::ZERO, credited.min(balance))
    };

    let mut balance_after = balance.saturating_sub(to_principal);

    let forgiveness_limit = match channel {
        ChannelKind::Cash => tolerances.paid_threshold.max(tolerances.cash_forgiveness),
        ChannelKind::Gateway => tolerances.paid_threshold,
    };
    let forgiven = if balance_after.is_positive() && balance_after <= forgiveness_limit {
        balance_after
    } else {
        Money::ZERO
    };
    balance_after = balance_after - forgiven;

    Allocation {
        breakdown: PaymentBreakdown {
            to_penalty,
            to_principal,
            excess: credited.saturating_sub(to_penalty + to_principal),
        },
        penalty_assessed: penalty,
        penalty_waived: penalty - to_penalty,
        forgiven,
        balance_before: balance,
        balance_after,
        paid: balance_after.is_zero(),
        full_settlement,
    }
}

/// single entry point for applying a payment of either channel
#[derive(Debug, Clone)]
pub struct PaymentDistributor {
    mora: MoraCalculator,
    tolerances: SettlementTolerances,
    drawer: DrawerPolicy,
    rounding: CashRounding,
    aggregator: LoanAggregator,
}

impl PaymentDistributor {
    pub fn new(config: &LendingConfig) -> Self {
        Self {
            mora: MoraCalculator::new(config.mora.clone()),
            tolerances: config.tolerances.clone(),
            drawer: config.drawer.clone(),
            rounding: CashRounding::new(config.tolerances.cash_rounding_step),
            aggregator: LoanAggregator::new(config.tolerances.loan_settled),
        }
    }

    pub fn mora(&self) -> &MoraCalculator {
        &self.mora
    }

    pub fn aggregator(&self) -> &LoanAggregator {
        &self.aggregator
    }

    /// mora assessment for an installment as of `now`
    pub fn assess(&self, ledger: &Ledger, installment_id: InstallmentId, now: DateTime<Utc>) -> Result<MoraAssessment> {
        let installment = ledger.installment(installment_id)?;
        self.mora
            .assess(installment.outstanding_balance, installment.due_date, now.date_naive())
    }

    /// apply a payment: payment record, installment, loan totals and for cash
    /// the drawer movements, all against the same ledger
    pub fn apply(&self, ledger: &mut Ledger, request: &PaymentRequest, now: DateTime<Utc>) -> Result<PaymentOutcome> {
        request.validate()?;

        let installment = ledger.installment(request.installment_id)?.clone();
        let channel = request.channel.kind();

        if installment.paid {
            if channel == ChannelKind::Cash {
                return Err(LendingError::InstallmentAlreadyPaid {
                    number: installment.sequence,
                });
            }
            // gateway money already taken: record it, nothing left to retire
            tracing::warn!(
                installment_id = %installment.id,
                sequence = installment.sequence,
                "gateway payment against an installment already paid"
            );
        } else {
            ensure_in_sequence(ledger, &installment)?;
        }

        let assessment = self
            .mora
            .assess(installment.outstanding_balance, installment.due_date, now.date_naive())?;

        let (credited, received, rounding_adjustment, change_due, shift_id) = match &request.channel {
            PaymentChannel::Cash { received } => {
                let rounded = self.rounding.apply(request.amount);
                if !rounded.charged.is_positive() {
                    return Err(LendingError::InvalidAmount { amount: request.amount });
                }
                if *received < rounded.charged {
                    return Err(LendingError::InsufficientTender {
                        charged: rounded.charged,
                        received: *received,
                    });
                }
                let change_due = *received - rounded.charged;

                let shift = ledger.active_shift().ok_or(LendingError::NoOpenShift)?;
                let shift_id = shift.id;
                let available = match self.drawer.change_check {
                    ChangeFundsCheck::PreTransaction => drawer::shift_balance(ledger, shift_id),
                    ChangeFundsCheck::IncludingTendered => drawer::shift_balance(ledger, shift_id) + *received,
                };
                if change_due > available {
                    return Err(LendingError::InsufficientDrawerFunds {
                        available,
                        change_due,
                    });
                }

                (rounded.charged, *received, rounded.adjustment, change_due, Some(shift_id))
            }
            PaymentChannel::Gateway { .. } => (request.amount, request.amount, Money::ZERO, Money::ZERO, None),
        };

        let allocation = allocate(
            installment.outstanding_balance,
            assessment.penalty,
            credited,
            channel,
            &self.tolerances,
        );

        let payment = Payment {
            id: Uuid::new_v4(),
            loan_id: installment.loan_id,
            installment_id: installment.id,
            client_id: installment.client_id,
            channel,
            gateway_token: request.channel.gateway_token().map(str::to_string),
            shift_id,
            credited,
            received,
            rounding_adjustment,
            change_given: change_due,
            breakdown: allocation.breakdown,
            penalty_assessed: allocation.penalty_assessed,
            days_late: assessment.days_late,
            forgiven: allocation.forgiven,
            balance_before: allocation.balance_before,
            balance_after: allocation.balance_after,
            status: PaymentStatus::Approved,
            created_at: now,
            voided_by: None,
            voided_at: None,
        };

        let updated = {
            let target = ledger.installment_mut(installment.id)?;
            target.outstanding_balance = allocation.balance_after;
            target.paid = allocation.paid;
            target.last_paid_at = Some(now);
            target.clone()
        };

        if shift_id.is_some() {
            drawer::record_movement(
                ledger,
                MovementRequest {
                    direction: MovementDirection::In,
                    amount: received,
                    reason: format!("installment {} payment", installment.sequence),
                    payment_id: Some(payment.id),
                },
                now,
            )?;
            if change_due.is_positive() {
                drawer::record_movement(
                    ledger,
                    MovementRequest {
                        direction: MovementDirection::Out,
                        amount: change_due,
                        reason: format!("change for installment {} payment", installment.sequence),
                        payment_id: Some(payment.id),
                    },
                    now,
                )?;
            }
        }

        ledger.events.emit(Event::PaymentApplied {
            payment_id: payment.id,
            loan_id: payment.loan_id,
            installment_id: payment.installment_id,
            channel,
            credited,
            to_principal: allocation.breakdown.to_principal,
            to_penalty: allocation.breakdown.to_penalty,
            remaining_balance: allocation.balance_after,
            timestamp: now,
        });
        if allocation.penalty_waived.is_positive() {
            ledger.events.emit(Event::PenaltyWaived {
                installment_id: installment.id,
                waived: allocation.penalty_waived,
                timestamp: now,
            });
        }
        if allocation.forgiven.is_positive() {
            ledger.events.emit(Event::ResidualForgiven {
                installment_id: installment.id,
                amount: allocation.forgiven,
                timestamp: now,
            });
        }

        ledger.insert_payment(payment.clone());
        let loan = self.aggregator.recompute(ledger, installment.loan_id, now)?;

        tracing::info!(
            payment_id = %payment.id,
            installment_id = %installment.id,
            channel = ?channel,
            credited = %credited,
            remaining = %allocation.balance_after,
            "payment applied"
        );

        Ok(PaymentOutcome {
            payment,
            installment: updated,
            loan,
            change_due,
        })
    }
}
