//! External contract system: the canonical payload pushed on acceptance, the
//! gateway seam, and the outbox record tracking delivery.

mod http;
mod retry;

pub use http::HttpContractGateway;
pub use retry::RetryPolicy;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::domain::{
    Contingencies, DocumentKind, Escalation, FinancingType, Offer, OfferId, OfferVersion, Property,
    PropertyId,
};

pub const TRANSACTION_SOURCE: &str = "offer_portal";

/// Identifier of the transaction space the contract system opened for an accepted offer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionSpaceId(pub String);

impl fmt::Display for TransactionSpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDocument {
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    pub filename: String,
    pub sha256_hash: String,
}

/// Everything the contract system needs to open a transaction. Field order and
/// document order are fixed so equal inputs hash equally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPayload {
    pub transaction_source: String,
    pub property_id: PropertyId,
    pub property_address: String,
    pub mls_number: String,
    pub offer_id: OfferId,
    pub accepted_version_id: String,
    pub decision_id: String,
    pub buyer_names: Vec<String>,
    pub offer_price: u64,
    pub earnest_money: u64,
    pub earnest_money_holder: String,
    pub financing_type: FinancingType,
    pub loan_amount: Option<u64>,
    pub down_payment: Option<u64>,
    pub closing_date: NaiveDate,
    pub possession_terms: String,
    pub contingencies: Contingencies,
    pub escalation: Escalation,
    pub documents: Vec<ContractDocument>,
    pub documents_hash: String,
    pub accepted_at: DateTime<Utc>,
}

impl ContractPayload {
    pub fn build(
        property: &Property,
        offer: &Offer,
        version: &OfferVersion,
        decision_id: &str,
        accepted_at: DateTime<Utc>,
    ) -> Self {
        let mut documents: Vec<ContractDocument> = version
            .documents
            .iter()
            .map(|document| ContractDocument {
                kind: document.kind,
                filename: document.filename.clone(),
                sha256_hash: document.sha256_hash.to_ascii_lowercase(),
            })
            .collect();
        documents.sort_by(|left, right| {
            left.sha256_hash
                .cmp(&right.sha256_hash)
                .then_with(|| left.filename.cmp(&right.filename))
        });
        let documents_hash = documents_hash(&documents);

        let terms = &version.payload;
        Self {
            transaction_source: TRANSACTION_SOURCE.to_string(),
            property_id: property.property_id.clone(),
            property_address: property.address.clone(),
            mls_number: property.mls_number.clone(),
            offer_id: offer.offer_id.clone(),
            accepted_version_id: version.version_id.to_string(),
            decision_id: decision_id.to_string(),
            buyer_names: terms.buyer_names.clone(),
            offer_price: terms.offer_price,
            earnest_money: terms.earnest_money,
            earnest_money_holder: terms.earnest_money_holder.clone(),
            financing_type: terms.financing_type,
            loan_amount: terms.loan_amount,
            down_payment: terms.down_payment,
            closing_date: terms.closing_date,
            possession_terms: terms.possession_terms.clone(),
            contingencies: terms.contingencies.clone(),
            escalation: terms.escalation.clone(),
            documents,
            documents_hash,
            accepted_at,
        }
    }

    /// SHA-256 over the canonical JSON encoding.
    pub fn payload_hash(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&encoded))
    }
}

/// Hash of the ordered document digests, so the contract system can check it
/// received the same set the seller saw.
pub fn documents_hash(documents: &[ContractDocument]) -> String {
    let mut hasher = Sha256::new();
    for document in documents {
        hasher.update(document.sha256_hash.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Errors from the external contract system.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IntegrationError {
    #[error("contract push timed out after {0:?}")]
    Timeout(Duration),
    #[error("contract push transport failure: {0}")]
    Transport(String),
    #[error("contract system rejected push: {status} - {message}")]
    Rejected { status: u16, message: String },
    #[error("contract system returned an unreadable response: {0}")]
    InvalidResponse(String),
    #[error("contract push endpoint is not configured")]
    NotConfigured,
}

/// Seam to the external contract system.
#[async_trait]
pub trait ContractGateway: Send + Sync {
    async fn push_contract(
        &self,
        payload: &ContractPayload,
    ) -> Result<TransactionSpaceId, IntegrationError>;
}

/// Gateway used when no endpoint is configured; every push stays pending.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredGateway;

#[async_trait]
impl ContractGateway for UnconfiguredGateway {
    async fn push_contract(
        &self,
        _payload: &ContractPayload,
    ) -> Result<TransactionSpaceId, IntegrationError> {
        Err(IntegrationError::NotConfigured)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    Pending,
    Confirmed,
    Failed,
}

impl PushStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

/// Outbox record for one acceptance's contract push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPush {
    pub push_id: String,
    pub offer_id: OfferId,
    pub property_id: PropertyId,
    pub decision_id: String,
    pub payload: ContractPayload,
    pub payload_hash: String,
    pub status: PushStatus,
    pub attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub transaction_space_id: Option<TransactionSpaceId>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContractPush {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PushStatus::Pending
            && self.next_attempt_at.map_or(true, |due| due <= now)
    }

    pub fn integration_status(&self) -> IntegrationStatus {
        match self.status {
            PushStatus::Confirmed => IntegrationStatus::Confirmed {
                push_id: self.push_id.clone(),
                transaction_space_id: self
                    .transaction_space_id
                    .clone()
                    .unwrap_or_else(|| TransactionSpaceId(String::new())),
            },
            PushStatus::Pending => IntegrationStatus::Pending {
                push_id: self.push_id.clone(),
                reason: self.last_error.clone().unwrap_or_default(),
                next_attempt_at: self.next_attempt_at,
            },
            PushStatus::Failed => IntegrationStatus::Failed {
                push_id: self.push_id.clone(),
                reason: self.last_error.clone().unwrap_or_default(),
            },
        }
    }
}

/// Integration outcome reported alongside a recorded decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IntegrationStatus {
    Confirmed {
        push_id: String,
        transaction_space_id: TransactionSpaceId,
    },
    Pending {
        push_id: String,
        reason: String,
        next_attempt_at: Option<DateTime<Utc>>,
    },
    Failed {
        push_id: String,
        reason: String,
    },
    NotApplicable,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(hash: &str, filename: &str) -> ContractDocument {
        ContractDocument {
            kind: DocumentKind::Contract,
            filename: filename.to_string(),
            sha256_hash: hash.to_string(),
        }
    }

    #[test]
    fn documents_hash_depends_on_digests_in_order() {
        let a = document(&"a".repeat(64), "a.pdf");
        let b = document(&"b".repeat(64), "b.pdf");
        let forward = documents_hash(&[a.clone(), b.clone()]);
        assert_eq!(forward, documents_hash(&[a.clone(), b.clone()]));
        assert_ne!(forward, documents_hash(&[b, a]));
        assert_eq!(forward.len(), 64);
    }
}
