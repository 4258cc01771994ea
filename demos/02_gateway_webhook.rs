/// gateway webhook - notification, retry after a timeout, duplicate delivery
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, TimeZone, Utc};
use lending_desk::{
    BackOffice, ChargeRequest, ChargeSession, ChargeUrls, ClientRegistration, DocumentKind, GatewayStatus,
    IdentityDocument, IdentityRecord, IdentityRegistry, LendingError, LoanRequest, Money, PaymentGateway, Rate,
    SafeTimeProvider, StatusReport, TimeSource,
};

struct StaticRegistry;

impl IdentityRegistry for StaticRegistry {
    fn lookup(&self, _document: &IdentityDocument) -> lending_desk::Result<IdentityRecord> {
        Ok(IdentityRecord {
            name: "Bodega El Sol SAC".to_string(),
            address: Some("Av. Grau 123".to_string()),
        })
    }
}

/// in-process gateway: charges are approved, the first status query times out
#[derive(Clone, Default)]
struct SandboxGateway {
    charges: Arc<Mutex<HashMap<String, ChargeRequest>>>,
    queries: Arc<Mutex<u32>>,
}

impl PaymentGateway for SandboxGateway {
    fn create_charge(&self, request: &ChargeRequest) -> lending_desk::Result<ChargeSession> {
        let token = format!("sbx-{}", &request.reference[..8]);
        self.charges.lock().unwrap().insert(token.clone(), request.clone());
        Ok(ChargeSession {
            redirect_url: format!("https://sandbox.pay/checkout/{}", token),
            token,
        })
    }

    fn query_status(&self, token: &str) -> lending_desk::Result<StatusReport> {
        let mut queries = self.queries.lock().unwrap();
        *queries += 1;
        if *queries == 1 {
            return Err(LendingError::GatewayTransient {
                token: token.to_string(),
                message: "read timed out".to_string(),
            });
        }
        let charges = self.charges.lock().unwrap();
        let charge = charges.get(token).ok_or(LendingError::GatewayRejected {
            message: format!("unknown token {}", token),
        })?;
        Ok(StatusReport {
            status: GatewayStatus::Approved,
            amount: charge.amount,
            reference: charge.reference.clone(),
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== gateway webhook example ===\n");

    let start = Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
    let office = BackOffice::builder()
        .time(SafeTimeProvider::new(TimeSource::Test(start)))
        .gateway(SandboxGateway::default())
        .identity_registry(StaticRegistry)
        .build()?;
    let controller = office.time().test_control().unwrap();

    let client = office.register_client(ClientRegistration {
        document: IdentityDocument::new(DocumentKind::Ruc, "20512345678"),
        name: None,
        address: None,
        phone: Some("987654321".to_string()),
        email: Some("caja@elsol.pe".to_string()),
    })?;

    let (_, installments) = office.issue_loan(LoanRequest {
        client_id: client.id,
        capital: Money::from_major(3_000),
        annual_rate: Rate::from_percentage(18),
        installments: 3,
        start_date: start.date_naive(),
    })?;
    let first = &installments[0];

    let session = office.start_gateway_charge(
        first.id,
        first.amount,
        None,
        ChargeUrls {
            return_url: "https://desk.example/paid".to_string(),
            notify_url: "https://desk.example/gateway/notify".to_string(),
        },
    )?;
    println!("client redirected to {}", session.redirect_url);

    // the webhook arrives but the status query times out
    let outcome = office.handle_gateway_notification(&session.token)?;
    println!("notification: {:?}", outcome);
    for token in office.pending_tokens()? {
        println!("  pending {} attempts {} next {:?}", token.token, token.attempts, token.next_attempt_at);
    }

    // the periodic sweep picks it up once the backoff has elapsed
    controller.advance(Duration::minutes(2));
    for (token, outcome) in office.sweep_pending_tokens()? {
        if let Some(payment_id) = outcome.payment_id() {
            println!("sweep settled {} as payment {}", token, payment_id);
        }
    }

    // the gateway retries its webhook; nothing is applied twice
    let duplicate = office.handle_gateway_notification(&session.token)?;
    println!("redelivery: {:?}", duplicate);

    let overview = office.active_loan_for_client(client.id)?.unwrap();
    println!("\noutstanding {} of {}", overview.loan.outstanding_balance, overview.loan.total_due);

    Ok(())
}
