use chrono::NaiveDate;
use hourglass_rs::{SafeTimeProvider, TimeSource};
use serde::{Deserialize, Serialize};

use crate::cash::{drawer, CashMovement, CashShift, MovementRequest, ShiftSummary};
use crate::clients::{self, Client, ClientRegistration, IdentityRegistry};
use crate::config::LendingConfig;
use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::events::Event;
use crate::gateway::{
    self, ChargeSession, ChargeUrls, GatewayReconciler, PaymentGateway, PendingToken, ReconcileOutcome, Trigger,
};
use crate::interest::MoraAssessment;
use crate::loans::{self, blocking_installment, Installment, Loan, LoanRequest};
use crate::notify::{deliver_receipt, Delivery, Notifier, Receipt, ReceiptRenderer};
use crate::payments::{self, Payment, PaymentDistributor, PaymentOutcome, PaymentRequest, VoidOutcome};
use crate::store::{MemoryStore, Store};
use crate::types::{ClientId, InstallmentId, PaymentChannel, PaymentId, ShiftId};

/// a loan with its schedule and payment history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanOverview {
    pub loan: Loan,
    /// ordered by sequence
    pub installments: Vec<Installment>,
    /// newest first
    pub payments: Vec<Payment>,
}

/// what paying an installment would cost today
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentQuote {
    pub installment_id: InstallmentId,
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub assessment: MoraAssessment,
    /// earlier installment that must be paid first
    pub blocked_by: Option<u32>,
    pub paid: bool,
}

impl InstallmentQuote {
    pub fn balance(&self) -> Money {
        self.assessment.balance
    }

    pub fn penalty(&self) -> Money {
        self.assessment.penalty
    }

    pub fn total_due(&self) -> Money {
        self.assessment.total_due()
    }

    pub fn can_pay_now(&self) -> bool {
        !self.paid && self.blocked_by.is_none()
    }
}

/// a committed payment and what happened to its receipt
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub outcome: PaymentOutcome,
    pub receipt: Option<Receipt>,
    pub delivery: Delivery,
}

/// the back office: settlement core over a store, a clock and collaborators
///
/// Every state change runs as one store transaction. Receipts and messages
/// go out only after the transaction committed, and their failures never
/// undo a payment.
pub struct BackOffice<S: Store = MemoryStore> {
    store: S,
    config: LendingConfig,
    time: SafeTimeProvider,
    distributor: PaymentDistributor,
    reconciler: GatewayReconciler,
    gateway: Box<dyn PaymentGateway>,
    identity: Box<dyn IdentityRegistry>,
    renderer: Option<Box<dyn ReceiptRenderer>>,
    notifier: Option<Box<dyn Notifier>>,
}

impl BackOffice<MemoryStore> {
    pub fn builder() -> BackOfficeBuilder {
        BackOfficeBuilder::new()
    }
}

impl<S: Store> BackOffice<S> {
    pub fn config(&self) -> &LendingConfig {
        &self.config
    }

    pub fn time(&self) -> &SafeTimeProvider {
        &self.time
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // clients

    pub fn register_client(&self, registration: ClientRegistration) -> Result<Client> {
        let identity = clients::resolve_identity(&registration, self.identity.as_ref())?;
        let now = self.time.now();
        let client = self
            .store
            .transact(|ledger| clients::insert_client(ledger, &registration, identity, now))?;
        tracing::info!(client_id = %client.id, document = %client.document, "client registered");
        Ok(client)
    }

    pub fn client(&self, client_id: ClientId) -> Result<Client> {
        self.store.read(|ledger| ledger.client(client_id).cloned())?
    }

    // loans

    pub fn issue_loan(&self, request: LoanRequest) -> Result<(Loan, Vec<Installment>)> {
        let now = self.time.now();
        let issued = self
            .store
            .transact(|ledger| loans::issue_loan(ledger, &request, &self.config.limits, now))?;
        tracing::info!(
            loan_id = %issued.0.id,
            client_id = %issued.0.client_id,
            capital = %issued.0.capital,
            installments = issued.0.installment_count,
            "loan issued"
        );
        Ok(issued)
    }

    /// the client's unsettled loan, totals recomputed before returning
    pub fn active_loan_for_client(&self, client_id: ClientId) -> Result<Option<LoanOverview>> {
        let now = self.time.now();
        self.store.transact(|ledger| {
            ledger.client(client_id)?;
            let Some(loan_id) = ledger.unsettled_loan_for_client(client_id).map(|l| l.id) else {
                return Ok(None);
            };
            self.distributor.aggregator().recompute(ledger, loan_id, now)?;

            Ok(Some(LoanOverview {
                loan: ledger.loan(loan_id)?.clone(),
                installments: ledger.installments_for_loan(loan_id).into_iter().cloned().collect(),
                payments: ledger.payments_for_loan(loan_id).into_iter().cloned().collect(),
            }))
        })
    }

    pub fn payments_for_installment(&self, installment_id: InstallmentId) -> Result<Vec<Payment>> {
        self.store.read(|ledger| -> Result<Vec<Payment>> {
            ledger.installment(installment_id)?;
            Ok(ledger
                .payments_for_installment(installment_id)
                .into_iter()
                .cloned()
                .collect())
        })?
    }

    pub fn quote_installment(&self, installment_id: InstallmentId) -> Result<InstallmentQuote> {
        let now = self.time.now();
        self.store.read(|ledger| -> Result<InstallmentQuote> {
            let installment = ledger.installment(installment_id)?;
            Ok(InstallmentQuote {
                installment_id,
                sequence: installment.sequence,
                due_date: installment.due_date,
                assessment: self.distributor.assess(ledger, installment_id, now)?,
                blocked_by: blocking_installment(ledger, installment.loan_id, installment.sequence),
                paid: installment.paid,
            })
        })?
    }

    // payments

    /// apply a counter payment through the single distribution entry point
    ///
    /// Only cash is taken here. Gateway money is credited once the gateway
    /// confirms it, through `handle_gateway_notification`,
    /// `verify_gateway_token` or `sweep_pending_tokens`; a token that already
    /// settled comes back from those as `ReconcileOutcome::Duplicate`.
    pub fn pay(&self, request: PaymentRequest) -> Result<Settlement> {
        if let PaymentChannel::Gateway { token } = &request.channel {
            return Err(LendingError::GatewayRejected {
                message: format!("token {} must be confirmed by the gateway before it is credited", token),
            });
        }

        let now = self.time.now();
        let outcome = self
            .store
            .transact(|ledger| self.distributor.apply(ledger, &request, now))?;
        Ok(self.settle_side_effects(outcome))
    }

    /// cash at the counter: `amount` owed, `received` handed over
    pub fn pay_cash(&self, installment_id: InstallmentId, amount: Money, received: Money) -> Result<Settlement> {
        self.pay(PaymentRequest::cash(installment_id, amount, received))
    }

    pub fn void_payment(&self, payment_id: PaymentId, requested_by: &str) -> Result<VoidOutcome> {
        let now = self.time.now();
        self.store.transact(|ledger| {
            payments::void_payment(ledger, payment_id, requested_by, self.distributor.aggregator(), now)
        })
    }

    // cash drawer

    pub fn open_shift(&self, opening_float: Money) -> Result<CashShift> {
        let now = self.time.now();
        self.store
            .transact(|ledger| drawer::open_shift(ledger, opening_float, now))
    }

    /// manual movement: change injection, withdrawal, refund
    pub fn record_movement(&self, request: MovementRequest) -> Result<CashMovement> {
        let now = self.time.now();
        self.store
            .transact(|ledger| drawer::record_movement(ledger, request, now))
    }

    pub fn current_balance(&self) -> Result<Money> {
        self.store.read(drawer::current_balance)?
    }

    pub fn close_shift(&self, counted_cash: Money) -> Result<CashShift> {
        let now = self.time.now();
        self.store
            .transact(|ledger| drawer::close_shift(ledger, counted_cash, now))
    }

    pub fn shift_summary(&self, shift_id: ShiftId) -> Result<ShiftSummary> {
        let now = self.time.now();
        self.store
            .read(|ledger| drawer::summarize_shift(ledger, shift_id, now))?
    }

    pub fn current_shift_summary(&self) -> Result<ShiftSummary> {
        let now = self.time.now();
        self.store.read(|ledger| -> Result<ShiftSummary> {
            let shift_id = ledger.active_shift().ok_or(LendingError::NoOpenShift)?.id;
            drawer::summarize_shift(ledger, shift_id, now)
        })?
    }

    pub fn shift_history(&self) -> Result<Vec<CashShift>> {
        self.store.read(drawer::shift_history)
    }

    // gateway

    /// open a gateway charge for an installment that can be paid now
    pub fn start_gateway_charge(
        &self,
        installment_id: InstallmentId,
        amount: Money,
        payer_email: Option<String>,
        urls: ChargeUrls,
    ) -> Result<ChargeSession> {
        let charge = self
            .store
            .read(|ledger| gateway::prepare_charge(ledger, installment_id, amount, payer_email, urls))??;
        let session = self.gateway.create_charge(&charge)?;
        tracing::info!(
            installment_id = %installment_id,
            token = %session.token,
            amount = %amount,
            "gateway charge created"
        );
        Ok(session)
    }

    /// webhook entry point
    pub fn handle_gateway_notification(&self, token: &str) -> Result<ReconcileOutcome> {
        self.reconcile(token, Trigger::Notification)
    }

    /// operator-triggered check; ignores backoff and exhausted retries
    pub fn verify_gateway_token(&self, token: &str) -> Result<ReconcileOutcome> {
        self.reconcile(token, Trigger::Manual)
    }

    pub fn sweep_pending_tokens(&self) -> Result<Vec<(String, ReconcileOutcome)>> {
        let results = self
            .reconciler
            .sweep(&self.store, self.gateway.as_ref(), &self.time)?;
        for (_, outcome) in &results {
            self.after_reconcile(outcome);
        }
        Ok(results)
    }

    pub fn pending_tokens(&self) -> Result<Vec<PendingToken>> {
        self.store.read(gateway::pending_tokens)
    }

    // events

    /// drain the committed event log
    pub fn take_events(&self) -> Result<Vec<Event>> {
        self.store.transact(|ledger| Ok(ledger.events.take_events()))
    }

    fn reconcile(&self, token: &str, trigger: Trigger) -> Result<ReconcileOutcome> {
        let outcome = self
            .reconciler
            .reconcile(&self.store, self.gateway.as_ref(), token, trigger, &self.time)?;
        self.after_reconcile(&outcome);
        Ok(outcome)
    }

    fn after_reconcile(&self, outcome: &ReconcileOutcome) {
        if let ReconcileOutcome::Settled(settled) = outcome {
            self.settle_side_effects(settled.as_ref().clone());
        }
    }

    /// receipt and message for a committed payment; never fails
    fn settle_side_effects(&self, outcome: PaymentOutcome) -> Settlement {
        let client = self
            .store
            .read(|ledger| ledger.client(outcome.payment.client_id).cloned())
            .and_then(|client| client);

        let client = match client {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(payment_id = %outcome.payment.id, error = %e, "receipt skipped");
                return Settlement {
                    outcome,
                    receipt: None,
                    delivery: Delivery::NotSent { url: None },
                };
            }
        };

        let receipt = Receipt::for_payment(&outcome.payment, &client, &outcome.installment);
        let delivery = match (&self.renderer, &self.notifier) {
            (Some(renderer), Some(notifier)) => deliver_receipt(
                &receipt,
                client.phone.as_deref(),
                renderer.as_ref(),
                notifier.as_ref(),
            ),
            _ => Delivery::NotSent { url: None },
        };

        Settlement {
            outcome,
            receipt: Some(receipt),
            delivery,
        }
    }
}

/// builder for the back office
#[derive(Default)]
pub struct BackOfficeBuilder {
    config: Option<LendingConfig>,
    time: Option<SafeTimeProvider>,
    gateway: Option<Box<dyn PaymentGateway>>,
    identity: Option<Box<dyn IdentityRegistry>>,
    renderer: Option<Box<dyn ReceiptRenderer>>,
    notifier: Option<Box<dyn Notifier>>,
}

impl BackOfficeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: LendingConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn time(mut self, time: SafeTimeProvider) -> Self {
        self.time = Some(time);
        self
    }

    pub fn gateway(mut self, gateway: impl PaymentGateway + 'static) -> Self {
        self.gateway = Some(Box::new(gateway));
        self
    }

    pub fn identity_registry(mut self, registry: impl IdentityRegistry + 'static) -> Self {
        self.identity = Some(Box::new(registry));
        self
    }

    pub fn renderer(mut self, renderer: impl ReceiptRenderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    /// build over a fresh in-memory store
    pub fn build(self) -> Result<BackOffice<MemoryStore>> {
        self.build_with_store(MemoryStore::new())
    }

    pub fn build_with_store<S: Store>(self, store: S) -> Result<BackOffice<S>> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let gateway = self.gateway.ok_or(LendingError::InvalidConfiguration {
            message: "payment gateway required".to_string(),
        })?;
        let identity = self.identity.ok_or(LendingError::InvalidConfiguration {
            message: "identity registry required".to_string(),
        })?;
        let time = self
            .time
            .unwrap_or_else(|| SafeTimeProvider::new(TimeSource::System));

        Ok(BackOffice {
            distributor: PaymentDistributor::new(&config),
            reconciler: GatewayReconciler::new(&config),
            store,
            config,
            time,
            gateway,
            identity,
            renderer: self.renderer,
            notifier: self.notifier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{DocumentKind, IdentityDocument, IdentityRecord};
    use crate::decimal::Rate;
    use crate::gateway::{ChargeRequest, GatewayStatus, StatusReport};
    use crate::notify::tests::{RecordingNotifier, StaticRenderer};
    use crate::types::{LoanStatus, MovementDirection, PaymentStatus};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct FixedRegistry;

    impl IdentityRegistry for FixedRegistry {
        fn lookup(&self, _document: &IdentityDocument) -> Result<IdentityRecord> {
            Ok(IdentityRecord {
                name: "Rosa Quispe Huaman".to_string(),
                address: None,
            })
        }
    }

    /// approves whatever it was told to approve
    #[derive(Default, Clone)]
    struct FakeGateway {
        reports: Arc<Mutex<HashMap<String, StatusReport>>>,
    }

    impl FakeGateway {
        fn approve(&self, token: &str, installment_id: InstallmentId, amount: Money) {
            self.reports.lock().unwrap().insert(
                token.to_string(),
                StatusReport {
                    status: GatewayStatus::Approved,
                    amount,
                    reference: installment_id.to_string(),
                },
            );
        }
    }

    impl PaymentGateway for FakeGateway {
        fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeSession> {
            Ok(ChargeSession {
                token: format!("tok-{}", &request.reference[..8]),
                redirect_url: "https://pay.test/checkout".to_string(),
            })
        }

        fn query_status(&self, token: &str) -> Result<StatusReport> {
            self.reports
                .lock()
                .unwrap()
                .get(token)
                .cloned()
                .ok_or(LendingError::GatewayTransient {
                    token: token.to_string(),
                    message: "no answer".to_string(),
                })
        }
    }

    struct SharedNotifier(Arc<RecordingNotifier>);

    impl Notifier for SharedNotifier {
        fn send_text(&self, recipient: &str, message: &str) -> Result<()> {
            self.0.send_text(recipient, message)
        }

        fn send_document(&self, recipient: &str, document_url: &str, caption: &str) -> Result<()> {
            self.0.send_document(recipient, document_url, caption)
        }
    }

    struct Harness {
        office: BackOffice,
        gateway: FakeGateway,
        notifier: Arc<RecordingNotifier>,
        installments: Vec<Installment>,
        client_id: ClientId,
    }

    fn harness_with(config: LendingConfig, notifier: RecordingNotifier, renderer_fails: bool) -> Harness {
        let start = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();
        let gateway = FakeGateway::default();
        let notifier = Arc::new(notifier);
        let office = BackOffice::builder()
            .config(config)
            .time(SafeTimeProvider::new(TimeSource::Test(start)))
            .gateway(gateway.clone())
            .identity_registry(FixedRegistry)
            .renderer(StaticRenderer { fail: renderer_fails })
            .notifier(SharedNotifier(notifier.clone()))
            .build()
            .unwrap();

        let client = office
            .register_client(ClientRegistration {
                document: IdentityDocument::new(DocumentKind::Dni, "45871236"),
                name: None,
                address: None,
                phone: Some("987654321".to_string()),
                email: Some("rosa@example.pe".to_string()),
            })
            .unwrap();

        let (_, installments) = office
            .issue_loan(LoanRequest {
                client_id: client.id,
                capital: Money::from_major(200),
                annual_rate: Rate::ZERO,
                installments: 2,
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            })
            .unwrap();

        Harness {
            office,
            gateway,
            notifier,
            installments,
            client_id: client.id,
        }
    }

    fn harness() -> Harness {
        harness_with(LendingConfig::default(), RecordingNotifier::default(), false)
    }

    #[test]
    fn test_counter_day() {
        let h = harness();
        h.office.open_shift(Money::from_major(100)).unwrap();

        let settlement = h
            .office
            .pay_cash(h.installments[0].id, Money::from_major(30), Money::from_major(50))
            .unwrap();
        assert_eq!(settlement.outcome.change_due, Money::from_major(20));
        assert_eq!(settlement.outcome.installment.outstanding_balance, Money::from_major(70));
        assert_eq!(settlement.outcome.loan.outstanding, Money::from_major(170));

        let receipt = settlement.receipt.unwrap();
        assert!(receipt.code().starts_with("B001-"));
        assert!(matches!(settlement.delivery, Delivery::Document { .. }));
        assert_eq!(h.notifier.sent.lock().unwrap()[0].0, "51987654321");

        assert_eq!(h.office.current_balance().unwrap(), Money::from_major(130));
        let summary = h.office.current_shift_summary().unwrap();
        assert_eq!(summary.cash_in, Money::from_major(50));
        assert_eq!(summary.cash_out, Money::from_major(20));
        assert_eq!(summary.payment_count, 1);

        let err = h.office.close_shift(Money::from_major(125)).unwrap_err();
        assert!(matches!(err, LendingError::ReconciliationMismatch { .. }));
        assert!(h.office.current_balance().is_ok());

        let closed = h.office.close_shift(Money::from_major(130)).unwrap();
        assert_eq!(closed.variance, Some(Money::ZERO));
        assert!(matches!(h.office.current_balance(), Err(LendingError::NoOpenShift)));
        assert_eq!(h.office.shift_history().unwrap().len(), 1);
    }

    #[test]
    fn test_late_partial_then_full() {
        let config = LendingConfig {
            mora: crate::config::MoraConfig {
                monthly_rate: Rate::from_percentage(5),
                days_per_month: 30,
            },
            ..Default::default()
        };
        let h = harness_with(config, RecordingNotifier::default(), false);
        let control = h.office.time().test_control().unwrap();
        control.advance(Duration::days(36));
        h.office.open_shift(Money::from_major(50)).unwrap();

        let first = h.installments[0].id;
        let quote = h.office.quote_installment(first).unwrap();
        assert_eq!(quote.penalty(), Money::from_major(5));
        assert_eq!(quote.total_due(), Money::from_major(105));
        assert!(quote.can_pay_now());

        let partial = h
            .office
            .pay_cash(first, Money::from_major(50), Money::from_major(50))
            .unwrap();
        let payment = &partial.outcome.payment;
        assert_eq!(payment.breakdown.to_principal, Money::from_major(50));
        assert_eq!(payment.breakdown.to_penalty, Money::ZERO);
        assert_eq!(payment.penalty_waived(), Money::from_major(5));

        let quote = h.office.quote_installment(first).unwrap();
        assert_eq!(quote.total_due(), Money::from_minor(5_250));

        let full = h
            .office
            .pay_cash(first, Money::from_minor(5_250), Money::from_major(60))
            .unwrap();
        assert!(full.outcome.installment.paid);
        assert_eq!(full.outcome.payment.breakdown.to_penalty, Money::from_minor(250));
        assert_eq!(h.office.payments_for_installment(first).unwrap().len(), 2);

        let second = h.office.quote_installment(h.installments[1].id).unwrap();
        assert!(second.can_pay_now());
    }

    #[test]
    fn test_installments_paid_in_order() {
        let h = harness();
        h.office.open_shift(Money::from_major(100)).unwrap();

        let quote = h.office.quote_installment(h.installments[1].id).unwrap();
        assert_eq!(quote.blocked_by, Some(1));

        let err = h
            .office
            .pay_cash(h.installments[1].id, Money::from_major(100), Money::from_major(100))
            .unwrap_err();
        assert!(matches!(err, LendingError::SequenceViolation { requested: 2, blocking: 1 }));
        assert_eq!(h.office.current_balance().unwrap(), Money::from_major(100));
    }

    #[test]
    fn test_gateway_settles_once_and_sends_one_receipt() {
        let h = harness();
        let first = h.installments[0].id;
        let urls = ChargeUrls {
            return_url: "https://desk.test/return".to_string(),
            notify_url: "https://desk.test/notify".to_string(),
        };
        let session = h
            .office
            .start_gateway_charge(first, Money::from_major(100), None, urls)
            .unwrap();
        h.gateway.approve(&session.token, first, Money::from_major(100));

        let outcome = h.office.handle_gateway_notification(&session.token).unwrap();
        let payment_id = outcome.payment_id().unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Settled(_)));

        let again = h.office.verify_gateway_token(&session.token).unwrap();
        assert_eq!(again, ReconcileOutcome::Duplicate { payment_id });
        let redelivered = h.office.handle_gateway_notification(&session.token).unwrap();
        assert_eq!(redelivered.payment_id(), Some(payment_id));

        let payments = h.office.payments_for_installment(first).unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].gateway_token.as_deref(), Some(session.token.as_str()));
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
        assert!(h.office.pending_tokens().unwrap().is_empty());
    }

    #[test]
    fn test_gateway_credit_needs_confirmation() {
        let h = harness();
        let first = h.installments[0].id;

        // an unconfirmed token cannot be credited from the counter
        let err = h
            .office
            .pay(PaymentRequest::gateway(first, Money::from_major(100), "tok-unconfirmed"))
            .unwrap_err();
        assert!(matches!(err, LendingError::GatewayRejected { .. }));
        assert!(h.office.payments_for_installment(first).unwrap().is_empty());

        // once confirmed, repeating the token is a no-op that returns the prior payment
        h.gateway.approve("tok-dup", first, Money::from_major(100));
        let settled = h.office.verify_gateway_token("tok-dup").unwrap();
        let payment_id = settled.payment_id().unwrap();
        let repeat = h.office.verify_gateway_token("tok-dup").unwrap();
        assert_eq!(repeat, ReconcileOutcome::Duplicate { payment_id });
        assert_eq!(h.office.payments_for_installment(first).unwrap().len(), 1);
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unanswered_token_waits_for_sweep() {
        let h = harness();
        let first = h.installments[0].id;

        let outcome = h.office.handle_gateway_notification("tok-late").unwrap();
        assert!(matches!(outcome, ReconcileOutcome::QueryFailed { attempts: 1, .. }));
        assert_eq!(h.office.pending_tokens().unwrap().len(), 1);

        h.gateway.approve("tok-late", first, Money::from_major(100));
        assert!(h.office.sweep_pending_tokens().unwrap().is_empty());

        h.office.time().test_control().unwrap().advance(Duration::minutes(2));
        let swept = h.office.sweep_pending_tokens().unwrap();
        assert_eq!(swept.len(), 1);
        assert!(matches!(swept[0].1, ReconcileOutcome::Settled(_)));
        assert!(h.office.pending_tokens().unwrap().is_empty());
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_receipt_failures_keep_the_payment() {
        let broken = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let h = harness_with(LendingConfig::default(), broken, true);
        h.office.open_shift(Money::from_major(20)).unwrap();

        let settlement = h
            .office
            .pay_cash(h.installments[0].id, Money::from_major(100), Money::from_major(100))
            .unwrap();
        assert_eq!(settlement.delivery, Delivery::NotSent { url: None });
        assert!(settlement.receipt.is_some());

        let payments = h.office.payments_for_installment(h.installments[0].id).unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Approved);
    }

    #[test]
    fn test_void_restores_balance() {
        let h = harness();
        h.office.open_shift(Money::from_major(100)).unwrap();
        let paid = h
            .office
            .pay_cash(h.installments[0].id, Money::from_major(100), Money::from_major(100))
            .unwrap();
        assert!(paid.outcome.installment.paid);

        let voided = h.office.void_payment(paid.outcome.payment.id, "supervisor").unwrap();
        assert_eq!(voided.restored, Money::from_major(100));
        assert!(!voided.installment.paid);
        assert_eq!(voided.loan.outstanding, Money::from_major(200));

        let err = h
            .office
            .void_payment(paid.outcome.payment.id, "supervisor")
            .unwrap_err();
        assert!(matches!(err, LendingError::PaymentAlreadyVoided { .. }));

        // the cash stays in the drawer until someone pays it back out
        assert_eq!(h.office.current_balance().unwrap(), Money::from_major(200));
        h.office
            .record_movement(MovementRequest::manual(
                MovementDirection::Out,
                Money::from_major(100),
                "refund of voided payment",
            ))
            .unwrap();
        assert_eq!(h.office.current_balance().unwrap(), Money::from_major(100));
    }

    #[test]
    fn test_active_loan_overview() {
        let h = harness();
        let overview = h.office.active_loan_for_client(h.client_id).unwrap().unwrap();
        assert_eq!(overview.installments.len(), 2);
        assert!(overview.payments.is_empty());
        assert_eq!(overview.loan.status, LoanStatus::Pending);

        let err = h
            .office
            .issue_loan(LoanRequest {
                client_id: h.client_id,
                capital: Money::from_major(100),
                annual_rate: Rate::ZERO,
                installments: 1,
                start_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            })
            .unwrap_err();
        assert!(matches!(err, LendingError::ActiveLoanExists { .. }));

        let client = h.office.client(h.client_id).unwrap();
        assert_eq!(client.name, "ROSA QUISPE HUAMAN");
        assert!(h.office.active_loan_for_client(uuid::Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_events_drained_after_commit() {
        let h = harness();
        let events = h.office.take_events().unwrap();
        assert!(matches!(events[0], Event::ClientRegistered { .. }));
        assert!(matches!(events[1], Event::LoanIssued { .. }));
        assert_eq!(events.len(), 4);
        assert!(h.office.take_events().unwrap().is_empty());
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = BackOffice::builder()
            .identity_registry(FixedRegistry)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, LendingError::InvalidConfiguration { .. }));
    }
}
