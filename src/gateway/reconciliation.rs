use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use uuid::Uuid;

use crate::config::{GatewayRetryPolicy, LendingConfig};
use crate::errors::{LendingError, Result};
use crate::events::Event;
use crate::payments::{PaymentDistributor, PaymentOutcome, PaymentRequest};
use crate::store::{Ledger, Store};
use crate::types::PaymentId;

use super::{GatewayStatus, PaymentGateway, PendingToken, StatusReport, TokenState};

/// what started a reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// the gateway pushed a notification
    Notification,
    /// batch re-query of parked tokens
    Sweep,
    /// an operator asked for a token to be checked
    Manual,
}

/// result of reconciling one token
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Settled(Box<PaymentOutcome>),
    /// the token was settled before; nothing was applied again
    Duplicate { payment_id: PaymentId },
    NotApproved { status: GatewayStatus },
    /// the gateway has not decided yet
    StillPending { next_attempt_at: Option<DateTime<Utc>> },
    /// the status query failed; the token is parked
    QueryFailed {
        attempts: u32,
        next_attempt_at: Option<DateTime<Utc>>,
        message: String,
    },
    /// approved but could not be applied; kept for review
    Held { reason: String },
}

impl ReconcileOutcome {
    pub fn payment_id(&self) -> Option<PaymentId> {
        match self {
            ReconcileOutcome::Settled(outcome) => Some(outcome.payment.id),
            ReconcileOutcome::Duplicate { payment_id } => Some(*payment_id),
            _ => None,
        }
    }
}

/// turns gateway confirmations into payments, at most once per token
///
/// The token is written to the pending set before the gateway is queried so
/// that a failed query never loses it. The duplicate check and the payment
/// write share one store transaction.
#[derive(Debug, Clone)]
pub struct GatewayReconciler {
    distributor: PaymentDistributor,
    retry: GatewayRetryPolicy,
}

impl GatewayReconciler {
    pub fn new(config: &LendingConfig) -> Self {
        Self {
            distributor: PaymentDistributor::new(config),
            retry: config.gateway_retry.clone(),
        }
    }

    pub fn reconcile<S: Store>(
        &self,
        store: &S,
        gateway: &dyn PaymentGateway,
        token: &str,
        trigger: Trigger,
        time: &SafeTimeProvider,
    ) -> Result<ReconcileOutcome> {
        let token = token.trim();
        if token.is_empty() {
            return Err(LendingError::GatewayRejected {
                message: "empty gateway token".to_string(),
            });
        }

        let received_at = time.now();
        let prior = store.transact(|ledger| {
            if let Some(payment) = ledger.payment_by_token(token) {
                return Ok(Some(payment.id));
            }
            token_entry(ledger, token, received_at);
            Ok(None)
        })?;

        if let Some(payment_id) = prior {
            tracing::debug!(token = %token, ?trigger, "gateway token already settled");
            return Ok(ReconcileOutcome::Duplicate { payment_id });
        }

        tracing::debug!(token = %token, ?trigger, "querying gateway status");
        let report = gateway.query_status(token);
        let now = time.now();

        store.transact(|ledger| match &report {
            Ok(report) => self.settle(ledger, token, report, now),
            Err(e) => Ok(self.park(ledger, token, e, now)),
        })
    }

    /// re-query every parked token whose backoff has elapsed
    pub fn sweep<S: Store>(
        &self,
        store: &S,
        gateway: &dyn PaymentGateway,
        time: &SafeTimeProvider,
    ) -> Result<Vec<(String, ReconcileOutcome)>> {
        let now = time.now();
        let due: Vec<String> = store.read(|ledger| {
            ledger
                .pending_tokens
                .values()
                .filter(|t| t.is_due(now))
                .map(|t| t.token.clone())
                .collect()
        })?;

        let mut results = Vec::with_capacity(due.len());
        for token in due {
            let outcome = self.reconcile(store, gateway, &token, Trigger::Sweep, time)?;
            results.push((token, outcome));
        }

        tracing::info!(processed = results.len(), "pending gateway tokens swept");
        Ok(results)
    }

    fn settle(
        &self,
        ledger: &mut Ledger,
        token: &str,
        report: &StatusReport,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        if let Some(payment_id) = ledger.payment_by_token(token).map(|p| p.id) {
            token_entry(ledger, token, now).resolve(TokenState::Settled { payment_id }, now);
            return Ok(ReconcileOutcome::Duplicate { payment_id });
        }

        let entry = token_entry(ledger, token, now);
        entry.attempts += 1;
        entry.last_attempt_at = Some(now);

        match report.status {
            GatewayStatus::Rejected => {
                entry.resolve(TokenState::NotApproved { status: report.status }, now);
                ledger.events.emit(Event::GatewayPaymentNotApproved {
                    token: token.to_string(),
                    timestamp: now,
                });
                tracing::info!(token = %token, "gateway payment not approved");
                Ok(ReconcileOutcome::NotApproved { status: report.status })
            }
            GatewayStatus::Pending => {
                let next_attempt_at = self.next_attempt(entry.attempts, now);
                entry.state = TokenState::Received;
                entry.next_attempt_at = next_attempt_at;
                Ok(ReconcileOutcome::StillPending { next_attempt_at })
            }
            GatewayStatus::Approved => self.apply_approved(ledger, token, report, now),
        }
    }

    fn apply_approved(
        &self,
        ledger: &mut Ledger,
        token: &str,
        report: &StatusReport,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        let Ok(installment_id) = Uuid::parse_str(report.reference.trim()) else {
            let reason = format!("unknown charge reference {}", report.reference);
            return Ok(self.hold(ledger, token, reason, now));
        };

        // applied on a scratch copy so a rejected payment leaves only the hold behind
        let mut scratch = ledger.clone();
        let request = PaymentRequest::gateway(installment_id, report.amount, token);

        match self.distributor.apply(&mut scratch, &request, now) {
            Ok(outcome) => {
                *ledger = scratch;
                token_entry(ledger, token, now).resolve(
                    TokenState::Settled {
                        payment_id: outcome.payment.id,
                    },
                    now,
                );
                tracing::info!(
                    token = %token,
                    payment_id = %outcome.payment.id,
                    amount = %report.amount,
                    "gateway payment settled"
                );
                Ok(ReconcileOutcome::Settled(Box::new(outcome)))
            }
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => Ok(self.hold(ledger, token, e.to_string(), now)),
        }
    }

    fn hold(&self, ledger: &mut Ledger, token: &str, reason: String, now: DateTime<Utc>) -> ReconcileOutcome {
        let entry = token_entry(ledger, token, now);
        entry.state = TokenState::Failed { reason: reason.clone() };
        entry.next_attempt_at = None;
        entry.last_error = Some(reason.clone());

        ledger.events.emit(Event::GatewayPaymentHeld {
            token: token.to_string(),
            reason: reason.clone(),
            timestamp: now,
        });
        tracing::warn!(token = %token, reason = %reason, "approved gateway payment held for review");

        ReconcileOutcome::Held { reason }
    }

    fn park(&self, ledger: &mut Ledger, token: &str, error: &LendingError, now: DateTime<Utc>) -> ReconcileOutcome {
        let entry = token_entry(ledger, token, now);
        entry.attempts += 1;
        entry.last_attempt_at = Some(now);
        entry.last_error = Some(error.to_string());
        entry.state = TokenState::QueryFailed;
        entry.next_attempt_at = self.next_attempt(entry.attempts, now);

        let attempts = entry.attempts;
        let next_attempt_at = entry.next_attempt_at;

        ledger.events.emit(Event::GatewayTokenParked {
            token: token.to_string(),
            attempts,
            next_attempt_at,
            reason: error.to_string(),
            timestamp: now,
        });
        tracing::warn!(
            token = %token,
            attempts,
            next_attempt_at = ?next_attempt_at,
            error = %error,
            "gateway status query failed, token parked"
        );

        ReconcileOutcome::QueryFailed {
            attempts,
            next_attempt_at,
            message: error.to_string(),
        }
    }

    fn next_attempt(&self, attempts: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.retry.is_exhausted(attempts) {
            None
        } else {
            Some(now + self.retry.backoff_after(attempts))
        }
    }
}

fn token_entry<'a>(ledger: &'a mut Ledger, token: &str, now: DateTime<Utc>) -> &'a mut PendingToken {
    ledger
        .pending_tokens
        .entry(token.to_string())
        .or_insert_with(|| PendingToken::new(token, now))
}
