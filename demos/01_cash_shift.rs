/// cash shift - a day at the counter with controlled time
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use lending_desk::{
    BackOffice, ChargeRequest, ChargeSession, ClientRegistration, DocumentKind, IdentityDocument, IdentityRecord,
    IdentityRegistry, LendingError, LoanRequest, Money, MovementDirection, MovementRequest, PaymentGateway, Rate,
    SafeTimeProvider, StatusReport, TimeSource,
};

struct StaticRegistry;

impl IdentityRegistry for StaticRegistry {
    fn lookup(&self, document: &IdentityDocument) -> lending_desk::Result<IdentityRecord> {
        Ok(IdentityRecord {
            name: format!("client {}", document.number),
            address: None,
        })
    }
}

struct NoGateway;

impl PaymentGateway for NoGateway {
    fn create_charge(&self, _request: &ChargeRequest) -> lending_desk::Result<ChargeSession> {
        Err(LendingError::GatewayRejected {
            message: "gateway disabled".to_string(),
        })
    }

    fn query_status(&self, token: &str) -> lending_desk::Result<StatusReport> {
        Err(LendingError::GatewayTransient {
            token: token.to_string(),
            message: "gateway disabled".to_string(),
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== cash shift example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap()));
    let office = BackOffice::builder()
        .time(time)
        .gateway(NoGateway)
        .identity_registry(StaticRegistry)
        .build()?;
    let controller = office.time().test_control().unwrap();

    let client = office.register_client(ClientRegistration {
        document: IdentityDocument::new(DocumentKind::Dni, "70123456"),
        name: None,
        address: None,
        phone: None,
        email: None,
    })?;
    println!("registered {} ({})", client.name, client.document);

    let (_, installments) = office.issue_loan(LoanRequest {
        client_id: client.id,
        capital: Money::from_major(200),
        annual_rate: Rate::ZERO,
        installments: 2,
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
    })?;

    // morning: the drawer opens with a float
    office.open_shift(Money::from_major(100))?;
    println!("drawer opened with {}", office.current_balance()?);

    // first installment is overdue; the quote carries the penalty
    let quote = office.quote_installment(installments[0].id)?;
    println!(
        "installment 1: balance {} penalty {} ({} days late)",
        quote.balance(),
        quote.penalty(),
        quote.assessment.days_late
    );

    // the client brings 50 toward it
    controller.advance(Duration::hours(1));
    let partial = office.pay_cash(installments[0].id, Money::from_major(30), Money::from_major(50))?;
    println!(
        "paid 30 of installment 1, change {}, penalty waived {}",
        partial.outcome.change_due,
        partial.outcome.payment.penalty_waived()
    );
    println!("drawer now {}", office.current_balance()?);

    // installment 2 must wait for installment 1
    if let Err(e) = office.pay_cash(installments[1].id, Money::from_major(100), Money::from_major(100)) {
        println!("rejected: {}", e);
    }

    // a supervisor voids the payment and the cash goes back out by hand
    controller.advance(Duration::hours(1));
    let voided = office.void_payment(partial.outcome.payment.id, "supervisor")?;
    println!("voided, restored {} to installment 1", voided.restored);
    office.record_movement(MovementRequest::manual(
        MovementDirection::Out,
        Money::from_major(30),
        "refund of voided payment",
    ))?;

    // evening: count the drawer
    controller.advance(Duration::hours(5));
    if let Err(e) = office.close_shift(Money::from_major(95)) {
        println!("close refused: {}", e);
    }
    let closed = office.close_shift(office.current_balance()?)?;
    let summary = office.shift_summary(closed.id)?;
    println!("\nshift summary:");
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
