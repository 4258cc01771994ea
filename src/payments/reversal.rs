use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::events::Event;
use crate::loans::{Installment, LoanAggregator, LoanSummary};
use crate::store::Ledger;
use crate::types::{PaymentId, PaymentStatus};

use super::Payment;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoidOutcome {
    pub payment: Payment,
    pub installment: Installment,
    pub loan: LoanSummary,
    /// balance put back on the installment
    pub restored: Money,
}

/// void a payment and put back the balance it retired
///
/// The payment record stays, flagged as voided. Cash is not refunded here;
/// handing money back is a separate OUT movement on the drawer.
pub fn void_payment(
    ledger: &mut Ledger,
    payment_id: PaymentId,
    requested_by: &str,
    aggregator: &LoanAggregator,
    now: DateTime<Utc>,
) -> Result<VoidOutcome> {
    let payment = ledger.payment(payment_id)?.clone();
    if payment.is_voided() {
        return Err(LendingError::PaymentAlreadyVoided { id: payment_id });
    }

    let installment = ledger.installment_mut(payment.installment_id)?;
    let restored_balance = (installment.outstanding_balance + payment.balance_retired()).min(installment.amount);
    let restored = restored_balance - installment.outstanding_balance;
    installment.outstanding_balance = restored_balance;
    installment.paid = restored_balance.is_zero();
    let installment = installment.clone();

    let voided = {
        let record = ledger.payment_mut(payment_id)?;
        record.status = PaymentStatus::Voided;
        record.voided_by = Some(requested_by.to_string());
        record.voided_at = Some(now);
        record.clone()
    };

    ledger.events.emit(Event::PaymentVoided {
        payment_id,
        installment_id: installment.id,
        restored,
        voided_by: requested_by.to_string(),
        timestamp: now,
    });

    let loan = aggregator.recompute(ledger, installment.loan_id, now)?;

    tracing::info!(
        payment_id = %payment_id,
        installment_id = %installment.id,
        restored = %restored,
        voided_by = requested_by,
        "payment voided"
    );

    Ok(VoidOutcome {
        payment: voided,
        installment,
        loan,
        restored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LendingConfig, LoanLimits};
    use crate::decimal::Rate;
    use crate::loans::{issue_loan, LoanRequest};
    use crate::payments::{PaymentDistributor, PaymentRequest};
    use crate::store::tests::ledger_with_client;
    use crate::types::LoanStatus;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()
    }

    fn single_installment_loan() -> (Ledger, Installment) {
        let (mut ledger, client_id) = ledger_with_client();
        let request = LoanRequest {
            client_id,
            capital: Money::from_major(100),
            annual_rate: Rate::ZERO,
            installments: 1,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        };
        let (_, mut installments) = issue_loan(&mut ledger, &request, &LoanLimits::default(), now()).unwrap();
        (ledger, installments.remove(0))
    }

    #[test]
    fn test_void_restores_balance_and_reopens_loan() {
        let (mut ledger, installment) = single_installment_loan();
        let distributor = PaymentDistributor::new(&LendingConfig::default());

        let paid = distributor
            .apply(&mut ledger, &PaymentRequest::gateway(installment.id, Money::from_major(100), "t1"), now())
            .unwrap();
        assert_eq!(paid.loan.status, LoanStatus::Settled);

        let outcome = void_payment(&mut ledger, paid.payment.id, "supervisor", distributor.aggregator(), now()).unwrap();
        assert_eq!(outcome.restored, Money::from_major(100));
        assert_eq!(outcome.installment.outstanding_balance, Money::from_major(100));
        assert!(!outcome.installment.paid);
        assert_eq!(outcome.loan.status, LoanStatus::Pending);
        assert_eq!(outcome.payment.status, PaymentStatus::Voided);
        assert_eq!(outcome.payment.voided_by.as_deref(), Some("supervisor"));

        let err = void_payment(&mut ledger, paid.payment.id, "supervisor", distributor.aggregator(), now()).unwrap_err();
        assert_eq!(err, LendingError::PaymentAlreadyVoided { id: paid.payment.id });
    }

    #[test]
    fn test_void_partial_payment() {
        let (mut ledger, installment) = single_installment_loan();
        let distributor = PaymentDistributor::new(&LendingConfig::default());

        let first = distributor
            .apply(&mut ledger, &PaymentRequest::gateway(installment.id, Money::from_major(40), "a"), now())
            .unwrap();
        distributor
            .apply(&mut ledger, &PaymentRequest::gateway(installment.id, Money::from_major(30), "b"), now())
            .unwrap();

        let outcome = void_payment(&mut ledger, first.payment.id, "cashier", distributor.aggregator(), now()).unwrap();
        assert_eq!(outcome.installment.outstanding_balance, Money::from_major(70));
        assert_eq!(outcome.loan.outstanding, Money::from_major(70));
    }

    #[test]
    fn test_void_never_exceeds_installment_amount() {
        let (mut ledger, installment) = single_installment_loan();
        let distributor = PaymentDistributor::new(&LendingConfig::default());

        let paid = distributor
            .apply(&mut ledger, &PaymentRequest::gateway(installment.id, Money::from_major(100), "a"), now())
            .unwrap();
        // restore by hand, as if the balance had already been reinstated
        ledger.installment_mut(installment.id).unwrap().outstanding_balance = Money::from_major(80);

        let outcome = void_payment(&mut ledger, paid.payment.id, "cashier", distributor.aggregator(), now()).unwrap();
        assert_eq!(outcome.installment.outstanding_balance, Money::from_major(100));
        assert_eq!(outcome.restored, Money::from_major(20));
    }

    #[test]
    fn test_unknown_payment() {
        let (mut ledger, _) = single_installment_loan();
        let aggregator = LoanAggregator::new(Money::from_minor(50));
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            void_payment(&mut ledger, id, "cashier", &aggregator, now()).unwrap_err(),
            LendingError::PaymentNotFound { id }
        );
    }
}
