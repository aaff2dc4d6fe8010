use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::lifecycle::OfferStatus;

/// Identifier wrapper for listed properties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub String);

/// Identifier wrapper for buyer offers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OfferId(pub String);

/// Identifier wrapper for immutable offer snapshots (`<offer_id>-v<n>`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(PropertyId);
string_id!(OfferId);
string_id!(VersionId);

impl VersionId {
    pub fn for_offer(offer_id: &OfferId, version_number: u32) -> Self {
        Self(format!("{}-v{}", offer_id.0, version_number))
    }
}

/// Listing-side representative for a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingAgent {
    pub name: String,
    pub email: String,
    pub brokerage: String,
}

/// A single listing. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub property_id: PropertyId,
    pub address: String,
    pub mls_number: String,
    pub listing_price: u64,
    pub listing_agent: ListingAgent,
    pub offer_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.offer_deadline
            .map(|deadline| now > deadline)
            .unwrap_or(false)
    }
}

/// Listing registration payload. The identifier is generated when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProperty {
    #[serde(default)]
    pub property_id: Option<String>,
    pub address: String,
    pub mls_number: String,
    pub listing_price: u64,
    pub listing_agent: ListingAgent,
    #[serde(default)]
    pub offer_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancingType {
    Cash,
    Conventional,
    Fha,
    Va,
    Usda,
    Other,
}

impl FinancingType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Conventional => "conventional",
            Self::Fha => "fha",
            Self::Va => "va",
            Self::Usda => "usda",
            Self::Other => "other",
        }
    }

    pub const fn is_financed(self) -> bool {
        !matches!(self, Self::Cash)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contingencies {
    pub inspection: bool,
    #[serde(default)]
    pub inspection_days: Option<u16>,
    pub appraisal: bool,
    pub financing: bool,
    #[serde(default)]
    pub other_text: Option<String>,
}

impl Contingencies {
    pub fn count(&self) -> usize {
        let other = self
            .other_text
            .as_deref()
            .map(|text| !text.trim().is_empty())
            .unwrap_or(false);
        [self.inspection, self.appraisal, self.financing, other]
            .into_iter()
            .filter(|present| *present)
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub enabled: bool,
    #[serde(default)]
    pub cap_price: Option<u64>,
    #[serde(default)]
    pub increment: Option<u64>,
}

/// Buyer-proposed terms. Copied verbatim into every `OfferVersion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferTerms {
    pub buyer_names: Vec<String>,
    pub offer_price: u64,
    pub earnest_money: u64,
    pub earnest_money_holder: String,
    pub financing_type: FinancingType,
    #[serde(default)]
    pub loan_amount: Option<u64>,
    #[serde(default)]
    pub down_payment: Option<u64>,
    pub closing_date: NaiveDate,
    pub possession_terms: String,
    #[serde(default)]
    pub contingencies: Contingencies,
    #[serde(default)]
    pub escalation: Escalation,
    #[serde(default)]
    pub inclusions_exclusions: String,
    #[serde(default)]
    pub agent_notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Contract,
    Addendum,
    ProofOfFunds,
    PreApproval,
    Other,
}

/// Reference handed over by document storage; the engine never sees file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpload {
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    pub filename: String,
    pub storage_url: String,
    pub sha256_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    pub filename: String,
    pub storage_url: String,
    pub sha256_hash: String,
    pub uploaded_by_user_id: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Current state of one buyer's proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub offer_id: OfferId,
    pub property_id: PropertyId,
    pub status: OfferStatus,
    pub current_version_id: VersionId,
    pub current_version_number: u32,
    pub submitted_by_agent_id: String,
    #[serde(flatten)]
    pub terms: OfferTerms,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every committed change; backs the optimistic write check.
    pub revision: u64,
}

/// Immutable snapshot of an offer's terms and documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferVersion {
    pub version_id: VersionId,
    pub offer_id: OfferId,
    pub version_number: u32,
    pub payload: OfferTerms,
    pub documents: Vec<Document>,
    pub submitted_by_user_id: String,
    pub submitted_at: DateTime<Utc>,
}

impl OfferVersion {
    pub fn has_document(&self, kind: DocumentKind) -> bool {
        self.documents.iter().any(|document| document.kind == kind)
    }
}

/// Inbound payload creating a new offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferSubmission {
    pub property_id: PropertyId,
    #[serde(flatten)]
    pub terms: OfferTerms,
    #[serde(default)]
    pub documents: Vec<DocumentUpload>,
}

/// Inbound payload for a buyer's revised terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRevision {
    #[serde(flatten)]
    pub terms: OfferTerms,
    #[serde(default)]
    pub documents: Vec<DocumentUpload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    BuyerAgent,
    ListingAgent,
    Seller,
    Admin,
    System,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::BuyerAgent => "buyer_agent",
            Self::ListingAgent => "listing_agent",
            Self::Seller => "seller",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buyer_agent" | "agent" => Some(Self::BuyerAgent),
            "listing_agent" | "reviewer" => Some(Self::ListingAgent),
            "seller" => Some(Self::Seller),
            "admin" => Some(Self::Admin),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Already-authenticated caller identity supplied by the session provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: ActorRole,
}

pub const SYSTEM_USER_ID: &str = "system";
const INTERNAL_ADDRESS: &str = "internal";

/// Who is asking and from where; threaded through every mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: Actor,
    pub ip_address: String,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, role: ActorRole, ip_address: impl Into<String>) -> Self {
        Self {
            actor: Actor {
                user_id: user_id.into(),
                role,
            },
            ip_address: ip_address.into(),
        }
    }

    pub fn system() -> Self {
        Self::new(SYSTEM_USER_ID, ActorRole::System, INTERNAL_ADDRESS)
    }

    /// System actor acting on behalf of this request (cascades keep the origin address).
    pub fn as_system(&self) -> Self {
        Self::new(SYSTEM_USER_ID, ActorRole::System, self.ip_address.clone())
    }
}
