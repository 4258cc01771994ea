use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{LendingError, Result};
use crate::events::Event;
use crate::store::Ledger;
use crate::types::ClientId;

/// kind of national identity document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// national id, 8 digits
    Dni,
    /// taxpayer registry, 11 digits; business clients
    Ruc,
    /// foreigner card or passport
    ForeignId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityDocument {
    pub kind: DocumentKind,
    pub number: String,
}

impl IdentityDocument {
    pub fn new(kind: DocumentKind, number: impl Into<String>) -> Self {
        Self {
            kind,
            number: number.into().trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let digits = self.number.chars().all(|c| c.is_ascii_digit());
        let valid = match self.kind {
            DocumentKind::Dni => digits && self.number.len() == 8,
            DocumentKind::Ruc => digits && self.number.len() == 11,
            DocumentKind::ForeignId => {
                (6..=12).contains(&self.number.len())
                    && self.number.chars().all(|c| c.is_ascii_alphanumeric())
            }
        };

        if valid {
            Ok(())
        } else {
            Err(LendingError::IdentityLookupFailed {
                message: format!("malformed document {}", self),
            })
        }
    }

    /// business clients are billed with invoices instead of tickets
    pub fn is_business(&self) -> bool {
        self.kind == DocumentKind::Ruc
    }
}

impl fmt::Display for IdentityDocument {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self.kind {
            DocumentKind::Dni => "DNI",
            DocumentKind::Ruc => "RUC",
            DocumentKind::ForeignId => "CE",
        };
        write!(f, "{} {}", label, self.number)
    }
}

/// a registered borrower
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub document: IdentityDocument,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// what the identity registry knows about a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub name: String,
    pub address: Option<String>,
}

/// external national id / taxpayer registry
pub trait IdentityRegistry: Send + Sync {
    fn lookup(&self, document: &IdentityDocument) -> Result<IdentityRecord>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientRegistration {
    pub document: IdentityDocument,
    /// when absent the identity registry is consulted
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// name and address to register, from the request or the registry
pub fn resolve_identity(
    registration: &ClientRegistration,
    registry: &dyn IdentityRegistry,
) -> Result<IdentityRecord> {
    registration.document.validate()?;

    match registration.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => Ok(IdentityRecord {
            name: name.to_string(),
            address: registration.address.clone(),
        }),
        _ => {
            let record = registry.lookup(&registration.document).map_err(|e| {
                tracing::warn!(document = %registration.document, error = %e, "identity lookup failed");
                match e {
                    LendingError::IdentityLookupFailed { .. } => e,
                    other => LendingError::IdentityLookupFailed {
                        message: other.to_string(),
                    },
                }
            })?;
            Ok(IdentityRecord {
                name: record.name,
                address: registration.address.clone().or(record.address),
            })
        }
    }
}

/// write a new client; document numbers are unique
pub fn insert_client(
    ledger: &mut Ledger,
    registration: &ClientRegistration,
    identity: IdentityRecord,
    now: DateTime<Utc>,
) -> Result<Client> {
    if ledger.client_by_document(&registration.document).is_some() {
        return Err(LendingError::DuplicateClient {
            document: registration.document.to_string(),
        });
    }

    let client = Client {
        id: Uuid::new_v4(),
        document: registration.document.clone(),
        name: identity.name.to_uppercase(),
        address: identity.address,
        phone: registration.phone.clone(),
        email: registration.email.clone(),
        registered_at: now,
    };

    ledger.events.emit(Event::ClientRegistered {
        client_id: client.id,
        document: client.document.to_string(),
        timestamp: now,
    });
    ledger.clients.insert(client.id, client.clone());

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct FixedRegistry;

    impl IdentityRegistry for FixedRegistry {
        fn lookup(&self, document: &IdentityDocument) -> Result<IdentityRecord> {
            match document.number.as_str() {
                "20512345678" => Ok(IdentityRecord {
                    name: "Bodega El Sol SAC".to_string(),
                    address: Some("Av. Grau 123".to_string()),
                }),
                _ => Err(LendingError::IdentityLookupFailed {
                    message: "not found".to_string(),
                }),
            }
        }
    }

    fn registration(kind: DocumentKind, number: &str, name: Option<&str>) -> ClientRegistration {
        ClientRegistration {
            document: IdentityDocument::new(kind, number),
            name: name.map(str::to_string),
            address: None,
            phone: Some("51999888777".to_string()),
            email: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_document_validation() {
        assert!(IdentityDocument::new(DocumentKind::Dni, "12345678").validate().is_ok());
        assert!(IdentityDocument::new(DocumentKind::Dni, "1234567").validate().is_err());
        assert!(IdentityDocument::new(DocumentKind::Dni, "1234567a").validate().is_err());
        assert!(IdentityDocument::new(DocumentKind::Ruc, "20512345678").validate().is_ok());
        assert!(IdentityDocument::new(DocumentKind::ForeignId, "X12345").validate().is_ok());
        assert!(IdentityDocument::new(DocumentKind::Ruc, "20512345678").is_business());
    }

    #[test]
    fn test_registry_supplies_missing_name() {
        let reg = registration(DocumentKind::Ruc, "20512345678", None);
        let identity = resolve_identity(&reg, &FixedRegistry).unwrap();
        assert_eq!(identity.name, "Bodega El Sol SAC");
        assert_eq!(identity.address.as_deref(), Some("Av. Grau 123"));

        let mut ledger = Ledger::new();
        let client = insert_client(&mut ledger, &reg, identity, now()).unwrap();
        assert_eq!(client.name, "BODEGA EL SOL SAC");
        assert!(matches!(ledger.events.events()[0], Event::ClientRegistered { .. }));
    }

    #[test]
    fn test_lookup_failure_surfaces() {
        let reg = registration(DocumentKind::Dni, "87654321", None);
        let err = resolve_identity(&reg, &FixedRegistry).unwrap_err();
        assert!(matches!(err, LendingError::IdentityLookupFailed { .. }));

        // an explicit name skips the registry
        let reg = registration(DocumentKind::Dni, "87654321", Some("Ana Torres"));
        assert_eq!(resolve_identity(&reg, &FixedRegistry).unwrap().name, "Ana Torres");
    }

    #[test]
    fn test_duplicate_document() {
        let mut ledger = Ledger::new();
        let reg = registration(DocumentKind::Dni, "87654321", Some("Ana Torres"));
        let identity = resolve_identity(&reg, &FixedRegistry).unwrap();

        insert_client(&mut ledger, &reg, identity.clone(), now()).unwrap();
        let err = insert_client(&mut ledger, &reg, identity, now()).unwrap_err();
        assert_eq!(
            err,
            LendingError::DuplicateClient {
                document: "DNI 87654321".to_string()
            }
        );
        assert_eq!(ledger.clients.len(), 1);
    }
}
