use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clients::Client;
use crate::decimal::Money;
use crate::errors::Result;
use crate::loans::Installment;
use crate::payments::Payment;
use crate::types::{ChannelKind, PaymentId};

/// tax document type printed on a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptKind {
    /// business clients (RUC)
    Invoice,
    /// everyone else
    Ticket,
}

impl ReceiptKind {
    pub fn series(&self) -> &'static str {
        match self {
            ReceiptKind::Invoice => "F001",
            ReceiptKind::Ticket => "B001",
        }
    }
}

/// data printed on the receipt for one payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub kind: ReceiptKind,
    pub series: String,
    pub number: String,
    pub payment_id: PaymentId,
    pub client_name: String,
    pub client_document: String,
    pub installment_sequence: u32,
    pub amount: Money,
    pub to_principal: Money,
    pub to_penalty: Money,
    pub channel: ChannelKind,
    pub change_given: Money,
    pub issued_at: DateTime<Utc>,
}

impl Receipt {
    pub fn for_payment(payment: &Payment, client: &Client, installment: &Installment) -> Self {
        let kind = if client.document.is_business() {
            ReceiptKind::Invoice
        } else {
            ReceiptKind::Ticket
        };

        Self {
            kind,
            series: kind.series().to_string(),
            number: payment.id.simple().to_string()[..8].to_uppercase(),
            payment_id: payment.id,
            client_name: client.name.clone(),
            client_document: client.document.to_string(),
            installment_sequence: installment.sequence,
            amount: payment.credited,
            to_principal: payment.breakdown.to_principal,
            to_penalty: payment.breakdown.to_penalty,
            channel: payment.channel,
            change_given: payment.change_given,
            issued_at: payment.created_at,
        }
    }

    /// `F001-1A2B3C4D`
    pub fn code(&self) -> String {
        format!("{}-{}", self.series, self.number)
    }

    /// plain text version sent when the document cannot be rendered
    pub fn render_text(&self) -> String {
        let mut text = format!(
            "{} {}\n{} ({})\ninstallment {}\namount {}\n  principal {}\n  penalty {}",
            match self.kind {
                ReceiptKind::Invoice => "INVOICE",
                ReceiptKind::Ticket => "TICKET",
            },
            self.code(),
            self.client_name,
            self.client_document,
            self.installment_sequence,
            self.amount,
            self.to_principal,
            self.to_penalty,
        );
        if self.change_given.is_positive() {
            text.push_str(&format!("\nchange {}", self.change_given));
        }
        text
    }
}

/// renders a receipt into a durable document and returns its url
pub trait ReceiptRenderer: Send + Sync {
    fn render(&self, receipt: &Receipt) -> Result<String>;
}

/// outbound messaging to clients
pub trait Notifier: Send + Sync {
    fn send_text(&self, recipient: &str, message: &str) -> Result<()>;
    fn send_document(&self, recipient: &str, document_url: &str, caption: &str) -> Result<()>;
}

/// what happened to a receipt after the payment committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delivery {
    Document { url: String },
    TextOnly,
    /// rendered but not sent
    NotSent { url: Option<String> },
}

/// international form of a local mobile number: 9 digits starting with 9 get the 51 prefix
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    if digits.len() == 9 && digits.starts_with('9') {
        return Some(format!("51{}", digits));
    }
    Some(digits)
}

/// render and send a receipt; every failure is logged and swallowed
pub fn deliver_receipt(
    receipt: &Receipt,
    phone: Option<&str>,
    renderer: &dyn ReceiptRenderer,
    notifier: &dyn Notifier,
) -> Delivery {
    let url = match renderer.render(receipt) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(receipt = %receipt.code(), error = %e, "receipt rendering failed");
            None
        }
    };

    let Some(recipient) = phone.and_then(normalize_phone) else {
        tracing::debug!(receipt = %receipt.code(), "client has no phone, receipt not sent");
        return Delivery::NotSent { url };
    };

    match url {
        Some(url) => {
            let caption = format!("receipt {}", receipt.code());
            match notifier.send_document(&recipient, &url, &caption) {
                Ok(()) => Delivery::Document { url },
                Err(e) => {
                    tracing::warn!(receipt = %receipt.code(), error = %e, "receipt delivery failed");
                    Delivery::NotSent { url: Some(url) }
                }
            }
        }
        None => match notifier.send_text(&recipient, &receipt.render_text()) {
            Ok(()) => Delivery::TextOnly,
            Err(e) => {
                tracing::warn!(receipt = %receipt.code(), error = %e, "receipt text delivery failed");
                Delivery::NotSent { url: None }
            }
        },
    }
}
