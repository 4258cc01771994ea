use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::Result;
use crate::events::Event;
use crate::store::Ledger;
use crate::types::{LoanId, LoanStatus};

/// loan totals derived from its installments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanSummary {
    pub loan_id: LoanId,
    pub nominal_total: Money,
    pub outstanding: Money,
    pub total_paid: Money,
    pub unpaid_installments: u32,
    pub status: LoanStatus,
}

/// recomputes loan-level balance and status by re-scanning every installment
///
/// This is the only writer of a loan's derived fields. It is idempotent:
/// calling it twice in a row leaves the loan and the event log unchanged
/// the second time.
#[derive(Debug, Clone)]
pub struct LoanAggregator {
    settled_threshold: Money,
}

impl LoanAggregator {
    pub fn new(settled_threshold: Money) -> Self {
        Self { settled_threshold }
    }

    /// totals for a loan without writing anything
    pub fn summarize(&self, ledger: &Ledger, loan_id: LoanId) -> Result<LoanSummary> {
        ledger.loan(loan_id)?;
        let installments = ledger.installments_for_loan(loan_id);

        let nominal_total: Money = installments.iter().map(|i| i.amount).sum();
        let outstanding: Money = installments.iter().map(|i| i.outstanding_balance).sum();
        let unpaid_installments = installments.iter().filter(|i| !i.paid).count() as u32;

        let status = if outstanding <= self.settled_threshold || unpaid_installments == 0 {
            LoanStatus::Settled
        } else {
            LoanStatus::Pending
        };

        Ok(LoanSummary {
            loan_id,
            nominal_total,
            outstanding,
            total_paid: nominal_total.saturating_sub(outstanding),
            unpaid_installments,
            status,
        })
    }

    /// recompute and write the loan's derived fields
    pub fn recompute(&self, ledger: &mut Ledger, loan_id: LoanId, now: DateTime<Utc>) -> Result<LoanSummary> {
        let summary = self.summarize(ledger, loan_id)?;

        let loan = ledger.loan_mut(loan_id)?;
        let previous = loan.status;

        loan.outstanding_balance = summary.outstanding;
        loan.total_paid = summary.total_paid;
        loan.status = summary.status;

        let transition = match (previous, summary.status) {
            (LoanStatus::Pending, LoanStatus::Settled) => {
                loan.settled_at = Some(now);
                Some(Event::LoanSettled {
                    loan_id,
                    total_paid: summary.total_paid,
                    timestamp: now,
                })
            }
            (LoanStatus::Settled, LoanStatus::Pending) => {
                loan.settled_at = None;
                Some(Event::LoanReopened {
                    loan_id,
                    outstanding: summary.outstanding,
                    timestamp: now,
                })
            }
            _ => None,
        };

        if let Some(event) = transition {
            tracing::info!(loan_id = %loan_id, status = ?summary.status, "loan status changed");
            ledger.events.emit(event);
        }

        Ok(summary)
    }
}
