use super::decision::CounterTerms;
use super::domain::{DocumentUpload, NewProperty, OfferTerms};

/// Boundary checks on inbound payloads. Raised before any lock is taken.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("an offer needs at least one named buyer")]
    MissingBuyer,
    #[error("earnest money holder is required")]
    MissingEarnestMoneyHolder,
    #[error("escalation requires both a cap price and an increment")]
    EscalationIncomplete,
    #[error("escalation increment must be greater than zero")]
    EscalationIncrementZero,
    #[error("escalation cap {cap} is below the offer price {price}")]
    EscalationCapBelowPrice { cap: u64, price: u64 },
    #[error("loan amount {loan} exceeds the offer price {price}")]
    LoanExceedsPrice { loan: u64, price: u64 },
    #[error("down payment {down_payment} exceeds the offer price {price}")]
    DownPaymentExceedsPrice { down_payment: u64, price: u64 },
    #[error("inspection days supplied without an inspection contingency")]
    InspectionDaysWithoutInspection,
    #[error("document {filename} must carry a 64 character hex sha256 hash")]
    InvalidDocumentHash { filename: String },
    #[error("document entries need a filename and storage locator")]
    IncompleteDocument,
    #[error("property {field} is required")]
    MissingPropertyField { field: &'static str },
    #[error("property {0} is already registered")]
    DuplicateProperty(String),
    #[error("counter offers must change at least one term")]
    EmptyCounterTerms,
    #[error("{criterion} score {value} is outside 0..=10")]
    ScoreOutOfRange { criterion: &'static str, value: f64 },
    #[error("event {0} is not a review step; use its dedicated operation")]
    UnsupportedEvent(&'static str),
}

pub fn validate_terms(terms: &OfferTerms) -> Result<(), ValidationError> {
    if terms.buyer_names.iter().all(|name| name.trim().is_empty()) {
        return Err(ValidationError::MissingBuyer);
    }

    if terms.earnest_money_holder.trim().is_empty() {
        return Err(ValidationError::MissingEarnestMoneyHolder);
    }

    if let Some(loan) = terms.loan_amount {
        if loan > terms.offer_price {
            return Err(ValidationError::LoanExceedsPrice {
                loan,
                price: terms.offer_price,
            });
        }
    }

    if let Some(down_payment) = terms.down_payment {
        if down_payment > terms.offer_price {
            return Err(ValidationError::DownPaymentExceedsPrice {
                down_payment,
                price: terms.offer_price,
            });
        }
    }

    if terms.contingencies.inspection_days.is_some() && !terms.contingencies.inspection {
        return Err(ValidationError::InspectionDaysWithoutInspection);
    }

    let escalation = &terms.escalation;
    if escalation.enabled {
        let (Some(cap), Some(increment)) = (escalation.cap_price, escalation.increment) else {
            return Err(ValidationError::EscalationIncomplete);
        };
        if increment == 0 {
            return Err(ValidationError::EscalationIncrementZero);
        }
        if cap < terms.offer_price {
            return Err(ValidationError::EscalationCapBelowPrice {
                cap,
                price: terms.offer_price,
            });
        }
    }

    Ok(())
}

pub fn validate_documents(documents: &[DocumentUpload]) -> Result<(), ValidationError> {
    for document in documents {
        if document.filename.trim().is_empty() || document.storage_url.trim().is_empty() {
            return Err(ValidationError::IncompleteDocument);
        }

        let digest_ok = hex::decode(document.sha256_hash.trim())
            .map(|bytes| bytes.len() == 32)
            .unwrap_or(false);
        if !digest_ok {
            return Err(ValidationError::InvalidDocumentHash {
                filename: document.filename.clone(),
            });
        }
    }
    Ok(())
}

pub fn validate_property(property: &NewProperty) -> Result<(), ValidationError> {
    let required = [
        ("address", property.address.as_str()),
        ("mls_number", property.mls_number.as_str()),
        ("listing_agent.name", property.listing_agent.name.as_str()),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingPropertyField { field });
        }
    }
    if property
        .property_id
        .as_deref()
        .is_some_and(|id| id.trim().is_empty())
    {
        return Err(ValidationError::MissingPropertyField {
            field: "property_id",
        });
    }
    Ok(())
}

pub fn validate_counter_terms(terms: &CounterTerms) -> Result<(), ValidationError> {
    if terms.is_empty() {
        return Err(ValidationError::EmptyCounterTerms);
    }
    Ok(())
}

pub fn validate_score(criterion: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (0.0..=10.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::ScoreOutOfRange { criterion, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::offers::domain::{
        Contingencies, DocumentKind, Escalation, FinancingType,
    };
    use chrono::NaiveDate;

    fn terms() -> OfferTerms {
        OfferTerms {
            buyer_names: vec!["Jordan Reyes".to_string()],
            offer_price: 500_000,
            earnest_money: 10_000,
            earnest_money_holder: "Buckeye Title".to_string(),
            financing_type: FinancingType::Conventional,
            loan_amount: Some(400_000),
            down_payment: Some(100_000),
            closing_date: NaiveDate::from_ymd_opt(2026, 5, 1).expect("valid"),
            possession_terms: "at closing".to_string(),
            contingencies: Contingencies::default(),
            escalation: Escalation::default(),
            inclusions_exclusions: String::new(),
            agent_notes: String::new(),
        }
    }

    #[test]
    fn escalation_needs_cap_at_or_above_price() {
        let mut terms = terms();
        terms.escalation = Escalation {
            enabled: true,
            cap_price: Some(490_000),
            increment: Some(5_000),
        };
        assert_eq!(
            validate_terms(&terms),
            Err(ValidationError::EscalationCapBelowPrice {
                cap: 490_000,
                price: 500_000
            })
        );

        terms.escalation.cap_price = None;
        assert_eq!(
            validate_terms(&terms),
            Err(ValidationError::EscalationIncomplete)
        );

        terms.escalation.cap_price = Some(520_000);
        assert_eq!(validate_terms(&terms), Ok(()));
    }

    #[test]
    fn financing_amounts_cannot_exceed_the_price() {
        let mut terms = terms();
        terms.down_payment = Some(u64::MAX / 4);
        assert_eq!(
            validate_terms(&terms),
            Err(ValidationError::DownPaymentExceedsPrice {
                down_payment: u64::MAX / 4,
                price: 500_000
            })
        );

        terms.down_payment = Some(500_000);
        assert_eq!(validate_terms(&terms), Ok(()));

        terms.loan_amount = Some(600_000);
        assert_eq!(
            validate_terms(&terms),
            Err(ValidationError::LoanExceedsPrice {
                loan: 600_000,
                price: 500_000
            })
        );
    }

    #[test]
    fn blank_buyer_names_are_rejected() {
        let mut terms = terms();
        terms.buyer_names = vec!["  ".to_string()];
        assert_eq!(validate_terms(&terms), Err(ValidationError::MissingBuyer));
    }

    #[test]
    fn document_hash_must_be_a_sha256_digest() {
        let mut upload = DocumentUpload {
            kind: DocumentKind::PreApproval,
            filename: "preapproval.pdf".to_string(),
            storage_url: "s3://offers/preapproval.pdf".to_string(),
            sha256_hash: "abc123".to_string(),
        };
        assert!(matches!(
            validate_documents(std::slice::from_ref(&upload)),
            Err(ValidationError::InvalidDocumentHash { .. })
        ));

        upload.sha256_hash = "a".repeat(64);
        assert_eq!(validate_documents(&[upload]), Ok(()));
    }

    #[test]
    fn scores_outside_range_are_rejected() {
        assert!(validate_score("price_strength", 10.0).is_ok());
        assert!(validate_score("price_strength", -0.1).is_err());
        assert!(validate_score("price_strength", f64::NAN).is_err());
    }
}
