pub mod cash;
pub mod clients;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod interest;
pub mod loans;
pub mod notify;
pub mod office;
pub mod payments;
pub mod store;
pub mod types;

// re-export key types
pub use decimal::{Money, Rate};
pub use errors::{LendingError, Result};
pub use events::{Event, EventStore};
pub use config::{ChangeFundsCheck, GatewayRetryPolicy, LendingConfig, LoanLimits, MoraConfig, SettlementTolerances};
pub use clients::{Client, ClientRegistration, DocumentKind, IdentityDocument, IdentityRecord, IdentityRegistry};
pub use loans::{AmortizationSchedule, Installment, Loan, LoanAggregator, LoanRequest, LoanSummary};
pub use interest::{MoraAssessment, MoraCalculator};
pub use payments::{Payment, PaymentDistributor, PaymentOutcome, PaymentRequest, VoidOutcome};
pub use cash::{CashMovement, CashShift, MovementRequest, ShiftSummary};
pub use gateway::{
    ChargeRequest, ChargeSession, ChargeUrls, GatewayReconciler, GatewayStatus, PaymentGateway, PendingToken,
    ReconcileOutcome, StatusReport, Trigger,
};
pub use notify::{Delivery, Notifier, Receipt, ReceiptKind, ReceiptRenderer};
pub use office::{BackOffice, BackOfficeBuilder, InstallmentQuote, LoanOverview, Settlement};
pub use store::{Ledger, MemoryStore, Store};
pub use types::{
    ChannelKind, ClientId, InstallmentId, LoanId, LoanStatus, MovementDirection, PaymentBreakdown, PaymentChannel,
    PaymentId, PaymentStatus, ShiftId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
