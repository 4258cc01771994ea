/// quick start - issue a loan and take a cash payment at the counter
use lending_desk::{
    BackOffice, ChargeRequest, ChargeSession, ClientRegistration, DocumentKind, IdentityDocument, IdentityRecord,
    IdentityRegistry, LendingError, LoanRequest, Money, PaymentGateway, Rate, StatusReport,
};

/// registry that never answers; the demo always supplies the name
struct NoRegistry;

impl IdentityRegistry for NoRegistry {
    fn lookup(&self, _document: &IdentityDocument) -> lending_desk::Result<IdentityRecord> {
        Err(LendingError::IdentityLookupFailed {
            message: "registry offline".to_string(),
        })
    }
}

/// gateway stub; this demo only takes cash
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
    let office = BackOffice::builder()
        .gateway(NoGateway)
        .identity_registry(NoRegistry)
        .build()?;

    let client = office.register_client(ClientRegistration {
        document: IdentityDocument::new(DocumentKind::Dni, "45871236"),
        name: Some("Rosa Quispe Huaman".to_string()),
        address: None,
        phone: None,
        email: None,
    })?;

    // 1,000 at 10% TEA over 6 monthly installments
    let (loan, installments) = office.issue_loan(LoanRequest {
        client_id: client.id,
        capital: Money::from_major(1_000),
        annual_rate: Rate::from_percentage(10),
        installments: 6,
        start_date: office.time().now().date_naive(),
    })?;
    println!("loan {} installment {}", loan.id, loan.installment_amount);
    for installment in &installments {
        println!("  #{} due {} {}", installment.sequence, installment.due_date, installment.amount);
    }

    // cash needs an open drawer
    office.open_shift(Money::from_major(50))?;
    let settlement = office.pay_cash(installments[0].id, installments[0].amount, Money::from_major(200))?;
    println!("change due: {}", settlement.outcome.change_due);

    println!("{}", serde_json::to_string_pretty(&settlement.outcome)?);

    Ok(())
}
