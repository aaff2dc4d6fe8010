use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::authorization::{AuthorizationLevel, Consents, ESignInput, SellerAuthorization};
use super::domain::{Offer, OfferId, PropertyId};
use super::integration::IntegrationStatus;
use super::lifecycle::OfferEvent;

/// Seller-proposed changes. Only the fields that differ from the buyer's terms are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterTerms {
    #[serde(default)]
    pub counter_price: Option<u64>,
    #[serde(default)]
    pub earnest_money: Option<u64>,
    #[serde(default)]
    pub closing_date: Option<NaiveDate>,
    #[serde(default)]
    pub possession_terms: Option<String>,
    #[serde(default)]
    pub contingency_changes: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CounterTerms {
    /// True when no term is actually countered; notes and expiry alone don't count.
    pub fn is_empty(&self) -> bool {
        let blank = |text: &Option<String>| text.as_deref().map_or(true, |t| t.trim().is_empty());
        self.counter_price.is_none()
            && self.earnest_money.is_none()
            && self.closing_date.is_none()
            && blank(&self.possession_terms)
            && blank(&self.contingency_changes)
    }
}

/// What the seller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionCommand {
    Accept,
    Decline {
        #[serde(default)]
        note: Option<String>,
    },
    Counter {
        terms: CounterTerms,
    },
}

impl DecisionCommand {
    pub const fn event(&self) -> OfferEvent {
        match self {
            Self::Accept => OfferEvent::Accept,
            Self::Decline { .. } => OfferEvent::Decline,
            Self::Counter { .. } => OfferEvent::Counter,
        }
    }

    pub const fn authorization_level(&self) -> AuthorizationLevel {
        match self {
            Self::Accept => AuthorizationLevel::Full,
            Self::Decline { .. } => AuthorizationLevel::SignatureOnly,
            Self::Counter { .. } => AuthorizationLevel::Accuracy,
        }
    }

    pub(crate) fn into_payload(self) -> DecisionPayload {
        match self {
            Self::Accept => DecisionPayload::Accept,
            Self::Decline { note } => DecisionPayload::Decline {
                reason: DeclineReason::Seller { note },
            },
            Self::Counter { terms } => DecisionPayload::Counter { terms },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DeclineReason {
    Seller {
        #[serde(default)]
        note: Option<String>,
    },
    /// Forced by the acceptance of a sibling offer.
    Cascade { accepted_offer_id: OfferId },
}

/// What was decided, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionPayload {
    Accept,
    Decline { reason: DeclineReason },
    Counter { terms: CounterTerms },
}

impl DecisionPayload {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Decline { .. } => "decline",
            Self::Counter { .. } => "counter",
        }
    }

    pub fn is_cascade(&self) -> bool {
        matches!(
            self,
            Self::Decline {
                reason: DeclineReason::Cascade { .. }
            }
        )
    }
}

/// Write-once record of one seller (or cascade) decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerDecision {
    pub decision_id: String,
    pub offer_id: OfferId,
    pub property_id: PropertyId,
    pub version_id: String,
    pub decided_by_user_id: String,
    pub decision: DecisionPayload,
    /// Absent only on system-generated cascade declines.
    pub authorization: Option<SellerAuthorization>,
    pub decided_at: DateTime<Utc>,
}

/// Inbound seller decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub decision: DecisionCommand,
    #[serde(default)]
    pub consents: Consents,
    #[serde(default)]
    pub esign: ESignInput,
}

/// Result of a decision call: the decision itself is always recorded when this
/// is returned; `integration` reports the contract push separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionReceipt {
    pub decision_recorded: bool,
    pub decision: SellerDecision,
    pub offer: Offer,
    pub cascade_declined: Vec<OfferId>,
    pub integration: IntegrationStatus,
}
