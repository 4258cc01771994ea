use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::cash::{CashMovement, CashShift};
use crate::clients::{Client, IdentityDocument};
use crate::errors::{LendingError, Result};
use crate::events::EventStore;
use crate::gateway::PendingToken;
use crate::loans::{Installment, Loan};
use crate::payments::Payment;
use crate::types::{ClientId, InstallmentId, LoanId, MovementId, PaymentId, PaymentStatus, ShiftId};

/// the logical tables of the back office
///
/// Entities reference each other by id only. Query helpers return owned
/// orderings (installments by sequence, history newest first) so callers
/// never depend on map iteration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    pub clients: BTreeMap<ClientId, Client>,
    pub loans: BTreeMap<LoanId, Loan>,
    pub installments: BTreeMap<InstallmentId, Installment>,
    pub payments: BTreeMap<PaymentId, Payment>,
    pub shifts: BTreeMap<ShiftId, CashShift>,
    pub movements: BTreeMap<MovementId, CashMovement>,
    /// gateway tokens by token string
    pub pending_tokens: BTreeMap<String, PendingToken>,
    /// gateway token -> payment, the idempotency index
    pub payments_by_token: BTreeMap<String, PaymentId>,
    pub events: EventStore,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self, id: ClientId) -> Result<&Client> {
        self.clients.get(&id).ok_or(LendingError::ClientNotFound { id })
    }

    pub fn client_by_document(&self, document: &IdentityDocument) -> Option<&Client> {
        self.clients.values().find(|c| &c.document == document)
    }

    pub fn loan(&self, id: LoanId) -> Result<&Loan> {
        self.loans.get(&id).ok_or(LendingError::LoanNotFound { id })
    }

    pub fn loan_mut(&mut self, id: LoanId) -> Result<&mut Loan> {
        self.loans.get_mut(&id).ok_or(LendingError::LoanNotFound { id })
    }

    pub fn installment(&self, id: InstallmentId) -> Result<&Installment> {
        self.installments
            .get(&id)
            .ok_or(LendingError::InstallmentNotFound { id })
    }

    pub fn installment_mut(&mut self, id: InstallmentId) -> Result<&mut Installment> {
        self.installments
            .get_mut(&id)
            .ok_or(LendingError::InstallmentNotFound { id })
    }

    pub fn payment(&self, id: PaymentId) -> Result<&Payment> {
        self.payments.get(&id).ok_or(LendingError::PaymentNotFound { id })
    }

    pub fn payment_mut(&mut self, id: PaymentId) -> Result<&mut Payment> {
        self.payments
            .get_mut(&id)
            .ok_or(LendingError::PaymentNotFound { id })
    }

    /// write a payment and index its gateway token
    pub fn insert_payment(&mut self, payment: Payment) {
        if let Some(token) = &payment.gateway_token {
            self.payments_by_token.insert(token.clone(), payment.id);
        }
        self.payments.insert(payment.id, payment);
    }

    pub fn payment_by_token(&self, token: &str) -> Option<&Payment> {
        self.payments_by_token
            .get(token)
            .and_then(|id| self.payments.get(id))
    }

    /// installments of a loan ordered by sequence
    pub fn installments_for_loan(&self, loan_id: LoanId) -> Vec<&Installment> {
        let mut installments: Vec<&Installment> = self
            .installments
            .values()
            .filter(|i| i.loan_id == loan_id)
            .collect();
        installments.sort_by_key(|i| i.sequence);
        installments
    }

    /// payments of a loan, newest first
    pub fn payments_for_loan(&self, loan_id: LoanId) -> Vec<&Payment> {
        newest_first(self.payments.values().filter(|p| p.loan_id == loan_id))
    }

    /// payments of one installment, newest first
    pub fn payments_for_installment(&self, installment_id: InstallmentId) -> Vec<&Payment> {
        newest_first(
            self.payments
                .values()
                .filter(|p| p.installment_id == installment_id),
        )
    }

    pub fn loans_for_client(&self, client_id: ClientId) -> Vec<&Loan> {
        let mut loans: Vec<&Loan> = self
            .loans
            .values()
            .filter(|l| l.client_id == client_id)
            .collect();
        loans.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        loans
    }

    pub fn unsettled_loan_for_client(&self, client_id: ClientId) -> Option<&Loan> {
        self.loans
            .values()
            .find(|l| l.client_id == client_id && !l.is_settled())
    }

    pub fn shift(&self, id: ShiftId) -> Option<&CashShift> {
        self.shifts.get(&id)
    }

    /// the shift currently open, if any
    pub fn active_shift(&self) -> Option<&CashShift> {
        self.shifts.values().find(|s| !s.closed)
    }

    pub fn active_shift_mut(&mut self) -> Option<&mut CashShift> {
        self.shifts.values_mut().find(|s| !s.closed)
    }

    /// movements of a shift in the order they were recorded
    pub fn movements_for_shift(&self, shift_id: ShiftId) -> Vec<&CashMovement> {
        let mut movements: Vec<&CashMovement> = self
            .movements
            .values()
            .filter(|m| m.shift_id == shift_id)
            .collect();
        movements.sort_by_key(|m| (m.recorded_at, m.sequence));
        movements
    }

    /// approved payments that belong to a shift's time window
    pub fn approved_payments_between(
        &self,
        from: chrono::DateTime<chrono::Utc>,
        to: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Vec<&Payment> {
        self.payments
            .values()
            .filter(|p| p.status == PaymentStatus::Approved)
            .filter(|p| p.created_at >= from && to.map_or(true, |end| p.created_at <= end))
            .collect()
    }
}

fn newest_first<'a>(payments: impl Iterator<Item = &'a Payment>) -> Vec<&'a Payment> {
    let mut payments: Vec<&Payment> = payments.collect();
    payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    payments
}

/// persistence boundary for the settlement core
///
/// `transact` is all-or-nothing: when the closure returns `Err`, no change it
/// made is visible afterwards. Implementations must serialize transactions
/// that touch the same entities.
pub trait Store: Send + Sync {
    fn transact<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger) -> Result<T>;

    fn read<T, F>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&Ledger) -> T;
}

/// in-process store: one lock, copy-on-write transactions
#[derive(Debug, Default)]
pub struct MemoryStore {
    ledger: Mutex<Ledger>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(ledger: Ledger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
        }
    }

    /// serialize the whole ledger
    pub fn snapshot_json(&self) -> Result<String> {
        self.read(|ledger| serde_json::to_string_pretty(ledger))?
            .map_err(|e| LendingError::StoreUnavailable {
                message: e.to_string(),
            })
    }

    pub fn from_snapshot_json(json: &str) -> Result<Self> {
        let ledger: Ledger =
            serde_json::from_str(json).map_err(|e| LendingError::StoreUnavailable {
                message: e.to_string(),
            })?;
        Ok(Self::with_ledger(ledger))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Ledger>> {
        self.ledger.lock().map_err(|_| LendingError::StoreUnavailable {
            message: "ledger lock poisoned".to_string(),
        })
    }
}

impl Store for MemoryStore {
    fn transact<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger) -> Result<T>,
    {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        let value = operation(&mut working)?;
        *guard = working;
        Ok(value)
    }

    fn read<T, F>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&Ledger) -> T,
    {
        let guard = self.lock()?;
        Ok(query(&guard))
    }
}
