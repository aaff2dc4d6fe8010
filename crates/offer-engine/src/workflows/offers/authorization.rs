use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::OfferError;

/// The three consents a seller must grant before an acceptance is binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consents {
    #[serde(default)]
    pub confirm_accuracy: bool,
    #[serde(default)]
    pub authorize_smart_transaction: bool,
    #[serde(default)]
    pub authorize_sharing: bool,
}

impl Consents {
    pub const fn all_granted() -> Self {
        Self {
            confirm_accuracy: true,
            authorize_smart_transaction: true,
            authorize_sharing: true,
        }
    }

    fn missing(&self, level: AuthorizationLevel) -> Vec<&'static str> {
        let required = match level {
            AuthorizationLevel::Full => vec![
                ("confirm_accuracy", self.confirm_accuracy),
                ("authorize_smart_transaction", self.authorize_smart_transaction),
                ("authorize_sharing", self.authorize_sharing),
            ],
            AuthorizationLevel::Accuracy => vec![("confirm_accuracy", self.confirm_accuracy)],
            AuthorizationLevel::SignatureOnly => Vec::new(),
        };
        required
            .into_iter()
            .filter(|(_, granted)| !granted)
            .map(|(name, _)| name)
            .collect()
    }
}

/// Signature as typed by the seller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ESignInput {
    #[serde(default)]
    pub typed_name: String,
}

/// Captured signature evidence: who typed what, when, from where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ESignature {
    pub typed_name: String,
    pub timestamp: DateTime<Utc>,
    pub ip_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerAuthorization {
    pub seller_verified: bool,
    pub consents: Consents,
    pub esign: ESignature,
}

/// How much consent a decision kind needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationLevel {
    /// Acceptance: every consent plus signature.
    Full,
    /// Counter: accuracy confirmation plus signature.
    Accuracy,
    /// Decline: signature only.
    SignatureOnly,
}

/// Checks consent completeness, then signature presence.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationGuard;

impl AuthorizationGuard {
    pub fn new() -> Self {
        Self
    }

    pub fn check(
        &self,
        level: AuthorizationLevel,
        consents: &Consents,
        esign: &ESignInput,
        ip_address: &str,
        now: DateTime<Utc>,
    ) -> Result<SellerAuthorization, OfferError> {
        let missing = consents.missing(level);
        if !missing.is_empty() {
            return Err(OfferError::IncompleteAuthorization { missing });
        }

        let typed_name = esign.typed_name.trim();
        if typed_name.is_empty() {
            return Err(OfferError::MissingSignature);
        }

        Ok(SellerAuthorization {
            seller_verified: true,
            consents: *consents,
            esign: ESignature {
                typed_name: typed_name.to_string(),
                timestamp: now,
                ip_address: ip_address.to_string(),
            },
        })
    }
}
