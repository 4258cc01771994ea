pub mod reconciliation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::loans::ensure_in_sequence;
use crate::store::Ledger;
use crate::types::{InstallmentId, PaymentId};

pub use reconciliation::{GatewayReconciler, ReconcileOutcome, Trigger};

/// authoritative status of a gateway transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayStatus {
    Pending,
    Approved,
    Rejected,
}

/// charge to open on the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub amount: Money,
    /// our installment id; echoed back by `query_status`
    pub reference: String,
    pub subject: String,
    pub payer_email: Option<String>,
    pub return_url: String,
    pub notify_url: String,
}

/// an opened gateway session the client is redirected to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeSession {
    pub token: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: GatewayStatus,
    pub amount: Money,
    pub reference: String,
}

/// the contract required from the external payment processor
pub trait PaymentGateway: Send + Sync {
    fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeSession>;

    /// transient failures come back as `LendingError::GatewayTransient`
    fn query_status(&self, token: &str) -> Result<StatusReport>;
}

/// where the client goes after paying and where the gateway posts back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeUrls {
    pub return_url: String,
    pub notify_url: String,
}

/// lifecycle of one gateway token on our side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenState {
    /// notified, not yet confirmed either way
    Received,
    /// the last status query failed
    QueryFailed,
    Settled { payment_id: PaymentId },
    NotApproved { status: GatewayStatus },
    /// approved money that could not be applied; needs a person
    Failed { reason: String },
}

/// a gateway token we have heard about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingToken {
    pub token: String,
    pub received_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// `None` once automatic retries are exhausted
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub state: TokenState,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PendingToken {
    pub fn new(token: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            received_at: now,
            attempts: 0,
            last_attempt_at: None,
            next_attempt_at: Some(now),
            last_error: None,
            state: TokenState::Received,
            resolved_at: None,
        }
    }

    /// settled or definitively not approved
    pub fn is_resolved(&self) -> bool {
        matches!(
            self.state,
            TokenState::Settled { .. } | TokenState::NotApproved { .. }
        )
    }

    /// eligible for an automatic re-query at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, TokenState::Received | TokenState::QueryFailed)
            && self.next_attempt_at.is_some_and(|at| at <= now)
    }

    fn resolve(&mut self, state: TokenState, now: DateTime<Utc>) {
        self.state = state;
        self.resolved_at = Some(now);
        self.next_attempt_at = None;
        self.last_error = None;
    }
}

/// tokens still needing attention, oldest first
pub fn pending_tokens(ledger: &Ledger) -> Vec<PendingToken> {
    let mut tokens: Vec<PendingToken> = ledger
        .pending_tokens
        .values()
        .filter(|t| !t.is_resolved())
        .cloned()
        .collect();
    tokens.sort_by(|a, b| a.received_at.cmp(&b.received_at));
    tokens
}

/// build the charge for an installment after checking it can be paid now
pub fn prepare_charge(
    ledger: &Ledger,
    installment_id: InstallmentId,
    amount: Money,
    payer_email: Option<String>,
    urls: ChargeUrls,
) -> Result<ChargeRequest> {
    if !amount.is_positive() {
        return Err(LendingError::InvalidAmount { amount });
    }

    let installment = ledger.installment(installment_id)?;
    if installment.paid {
        return Err(LendingError::InstallmentAlreadyPaid {
            number: installment.sequence,
        });
    }
    ensure_in_sequence(ledger, installment)?;

    let client = ledger.client(installment.client_id)?;

    Ok(ChargeRequest {
        amount,
        reference: installment_id.to_string(),
        subject: format!("installment {} - {}", installment.sequence, client.name),
        payer_email: payer_email.or_else(|| client.email.clone()),
        return_url: urls.return_url,
        notify_url: urls.notify_url,
    })
}
