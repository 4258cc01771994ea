pub mod aggregator;
pub mod amortization;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::LoanLimits;
use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};
use crate::events::Event;
use crate::store::Ledger;
use crate::types::{ClientId, InstallmentId, LoanId, LoanStatus};

pub use aggregator::{LoanAggregator, LoanSummary};
pub use amortization::{AmortizationSchedule, ScheduledInstallment};

/// an installment loan issued to one client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub client_id: ClientId,

    // terms, fixed at issuance
    pub capital: Money,
    pub annual_rate: Rate,
    pub monthly_rate: Rate,
    pub installment_count: u32,
    pub start_date: NaiveDate,
    pub installment_amount: Money,
    pub total_due: Money,

    // derived by the aggregator after every payment
    pub outstanding_balance: Money,
    pub total_paid: Money,
    pub status: LoanStatus,

    pub issued_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn is_settled(&self) -> bool {
        self.status == LoanStatus::Settled
    }
}

/// one scheduled repayment of a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub loan_id: LoanId,
    pub client_id: ClientId,
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub interest_portion: Money,
    pub principal_portion: Money,
    /// loan principal still owed after this installment, for reference
    pub remaining_principal: Money,
    pub outstanding_balance: Money,
    pub paid: bool,
    pub last_paid_at: Option<DateTime<Utc>>,
}

impl Installment {
    /// amount already retired from this installment
    pub fn amount_paid(&self) -> Money {
        self.amount.saturating_sub(self.outstanding_balance)
    }
}

/// request to issue a new loan
#[derive(Debug, Clone, PartialEq)]
pub struct LoanRequest {
    pub client_id: ClientId,
    pub capital: Money,
    /// annual effective rate (TEA)
    pub annual_rate: Rate,
    pub installments: u32,
    pub start_date: NaiveDate,
}

impl LoanRequest {
    pub fn validate(&self, limits: &LoanLimits) -> Result<()> {
        if !self.capital.is_positive() {
            return Err(LendingError::InvalidAmount { amount: self.capital });
        }
        if self.capital > limits.max_capital {
            return Err(LendingError::CapitalCeilingExceeded {
                ceiling: limits.max_capital,
                requested: self.capital,
            });
        }
        if self.installments == 0 || self.installments > limits.max_installments {
            return Err(LendingError::InstallmentCeilingExceeded {
                ceiling: limits.max_installments,
                requested: self.installments,
            });
        }
        if self.annual_rate.is_negative() {
            return Err(LendingError::InvalidInterestRate { rate: self.annual_rate });
        }
        Ok(())
    }
}

/// issue a loan and its full installment set into the ledger
///
/// Runs inside a store transaction, so either the loan and every
/// installment are written or nothing is.
pub fn issue_loan(
    ledger: &mut Ledger,
    request: &LoanRequest,
    limits: &LoanLimits,
    now: DateTime<Utc>,
) -> Result<(Loan, Vec<Installment>)> {
    request.validate(limits)?;
    ledger.client(request.client_id)?;

    if let Some(active) = ledger.unsettled_loan_for_client(request.client_id) {
        return Err(LendingError::ActiveLoanExists {
            client_id: request.client_id,
            loan_id: active.id,
        });
    }

    let schedule = AmortizationSchedule::generate(
        request.capital,
        request.annual_rate,
        request.installments,
        request.start_date,
        limits.installment_spacing_days,
    )?;

    let loan = Loan {
        id: Uuid::new_v4(),
        client_id: request.client_id,
        capital: request.capital,
        annual_rate: request.annual_rate,
        monthly_rate: Rate::from_decimal(schedule.monthly_rate.as_decimal().round_dp(6)),
        installment_count: request.installments,
        start_date: request.start_date,
        installment_amount: schedule.installment_amount,
        total_due: schedule.total_due,
        outstanding_balance: schedule.total_due,
        total_paid: Money::ZERO,
        status: LoanStatus::Pending,
        issued_at: now,
        settled_at: None,
    };

    let installments: Vec<Installment> = schedule
        .installments
        .iter()
        .map(|row| Installment {
            id: Uuid::new_v4(),
            loan_id: loan.id,
            client_id: loan.client_id,
            sequence: row.sequence,
            due_date: row.due_date,
            amount: row.installment_amount,
            interest_portion: row.interest_portion,
            principal_portion: row.principal_portion,
            remaining_principal: row.ending_balance,
            outstanding_balance: row.installment_amount,
            paid: false,
            last_paid_at: None,
        })
        .collect();

    ledger.events.emit(Event::LoanIssued {
        loan_id: loan.id,
        client_id: loan.client_id,
        capital: loan.capital,
        installment_amount: loan.installment_amount,
        installments: loan.installment_count,
        timestamp: now,
    });

    for installment in &installments {
        ledger.events.emit(Event::InstallmentScheduled {
            loan_id: loan.id,
            installment_id: installment.id,
            sequence: installment.sequence,
            due_date: installment.due_date,
            amount: installment.amount,
        });
        ledger.installments.insert(installment.id, installment.clone());
    }
    ledger.loans.insert(loan.id, loan.clone());

    Ok((loan, installments))
}

/// the first unpaid installment ahead of `sequence`, if any
pub fn blocking_installment(ledger: &Ledger, loan_id: LoanId, sequence: u32) -> Option<u32> {
    ledger
        .installments_for_loan(loan_id)
        .into_iter()
        .filter(|i| i.sequence < sequence && !i.paid)
        .map(|i| i.sequence)
        .min()
}

/// reject a payment on installment `sequence` while an earlier one is unpaid
pub fn ensure_in_sequence(ledger: &Ledger, installment: &Installment) -> Result<()> {
    match blocking_installment(ledger, installment.loan_id, installment.sequence) {
        Some(blocking) => Err(LendingError::SequenceViolation {
            requested: installment.sequence,
            blocking,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::ledger_with_client;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    fn request(client_id: ClientId) -> LoanRequest {
        LoanRequest {
            client_id,
            capital: Money::from_major(1_000),
            annual_rate: Rate::from_percentage(12),
            installments: 6,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        }
    }

    #[test]
    fn test_issue_loan_writes_schedule() {
        let (mut ledger, client_id) = ledger_with_client();

        let (loan, installments) =
            issue_loan(&mut ledger, &request(client_id), &LoanLimits::default(), now()).unwrap();

        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.outstanding_balance, loan.total_due);
        assert_eq!(loan.total_paid, Money::ZERO);
        assert_eq!(installments.len(), 6);
        assert_eq!(ledger.installments_for_loan(loan.id).len(), 6);

        for (index, installment) in ledger.installments_for_loan(loan.id).iter().enumerate() {
            assert_eq!(installment.sequence, index as u32 + 1);
            assert_eq!(installment.outstanding_balance, loan.installment_amount);
            assert!(!installment.paid);
        }

        assert!(matches!(ledger.events.events()[0], Event::LoanIssued { .. }));
    }

    #[test]
    fn test_ceilings() {
        let (mut ledger, client_id) = ledger_with_client();
        let limits = LoanLimits::default();

        let mut too_big = request(client_id);
        too_big.capital = Money::from_major(20_001);
        let err = issue_loan(&mut ledger, &too_big, &limits, now()).unwrap_err();
        assert!(matches!(err, LendingError::CapitalCeilingExceeded { .. }));
        assert!(err.is_validation());

        let mut too_long = request(client_id);
        too_long.installments = 25;
        let err = issue_loan(&mut ledger, &too_long, &limits, now()).unwrap_err();
        assert!(matches!(err, LendingError::InstallmentCeilingExceeded { ceiling: 24, requested: 25 }));

        assert!(ledger.loans.is_empty());
        assert!(ledger.installments.is_empty());
    }

    #[test]
    fn test_one_unsettled_loan_per_client() {
        let (mut ledger, client_id) = ledger_with_client();
        let limits = LoanLimits::default();

        let (first, _) = issue_loan(&mut ledger, &request(client_id), &limits, now()).unwrap();
        let err = issue_loan(&mut ledger, &request(client_id), &limits, now()).unwrap_err();
        assert_eq!(
            err,
            LendingError::ActiveLoanExists {
                client_id,
                loan_id: first.id
            }
        );

        // once settled, a new loan may be issued
        ledger.loans.get_mut(&first.id).unwrap().status = LoanStatus::Settled;
        assert!(issue_loan(&mut ledger, &request(client_id), &limits, now()).is_ok());
    }

    #[test]
    fn test_unknown_client() {
        let (mut ledger, _) = ledger_with_client();
        let err = issue_loan(&mut ledger, &request(Uuid::new_v4()), &LoanLimits::default(), now()).unwrap_err();
        assert!(matches!(err, LendingError::ClientNotFound { .. }));
    }

    #[test]
    fn test_sequence_enforcement() {
        let (mut ledger, client_id) = ledger_with_client();
        let (loan, installments) =
            issue_loan(&mut ledger, &request(client_id), &LoanLimits::default(), now()).unwrap();

        assert!(ensure_in_sequence(&ledger, &installments[0]).is_ok());
        assert_eq!(
            ensure_in_sequence(&ledger, &installments[2]).unwrap_err(),
            LendingError::SequenceViolation { requested: 3, blocking: 1 }
        );

        ledger.installment_mut(installments[0].id).unwrap().paid = true;
        assert_eq!(blocking_installment(&ledger, loan.id, 3), Some(2));
        assert!(ensure_in_sequence(&ledger, &installments[1]).is_ok());
    }
}
