use chrono::NaiveDate;

use super::super::domain::{DocumentKind, FinancingType, OfferTerms, OfferVersion, Property};
use super::rubric::CriterionValues;

/// Everything the heuristic looks at. Built from stored records only, so the
/// same inputs always produce the same criterion scores.
pub(crate) struct HeuristicInputs<'a> {
    pub terms: &'a OfferTerms,
    pub property: &'a Property,
    pub version: &'a OfferVersion,
}

pub(crate) fn derive_criteria(inputs: &HeuristicInputs<'_>) -> CriterionValues {
    let terms = inputs.terms;
    CriterionValues {
        price_strength: price_strength(terms.offer_price, inputs.property.listing_price),
        financing_certainty: financing_certainty(terms),
        contingency_risk: contingency_risk(terms),
        timeline_fit: timeline_fit(inputs.version.submitted_at.date_naive(), terms.closing_date),
        earnest_money_strength: earnest_money_strength(terms.earnest_money, terms.offer_price),
        buyer_readiness_docs: readiness_docs(terms.financing_type, inputs.version),
        other: if terms.escalation.enabled { 8.0 } else { 5.0 },
    }
}

fn price_strength(offer_price: u64, listing_price: u64) -> f64 {
    if listing_price == 0 {
        return 5.0;
    }
    let ratio = offer_price as f64 / listing_price as f64;
    if ratio >= 1.05 {
        10.0
    } else {
        (10.0 * (ratio - 0.85) / 0.20).clamp(0.0, 10.0)
    }
}

fn financing_certainty(terms: &OfferTerms) -> f64 {
    let base: f64 = match terms.financing_type {
        FinancingType::Cash => return 10.0,
        FinancingType::Conventional => 8.0,
        FinancingType::Va => 7.0,
        FinancingType::Fha | FinancingType::Usda => 6.0,
        FinancingType::Other => 5.0,
    };
    let strong_down_payment = terms
        .down_payment
        .is_some_and(|down| {
            terms.offer_price > 0
                && down
                    .checked_mul(5)
                    .map_or(true, |fivefold| fivefold >= terms.offer_price)
        });
    if strong_down_payment {
        (base + 1.0).min(10.0)
    } else {
        base
    }
}

fn contingency_risk(terms: &OfferTerms) -> f64 {
    let contingencies = &terms.contingencies;
    let mut score: f64 = 10.0;
    if contingencies.inspection {
        score -= 2.0;
        if contingencies.inspection_days.is_some_and(|days| days > 10) {
            score -= 1.0;
        }
    }
    if contingencies.appraisal {
        score -= 2.0;
    }
    if contingencies.financing {
        score -= 3.0;
    }
    if contingencies
        .other_text
        .as_deref()
        .is_some_and(|text| !text.trim().is_empty())
    {
        score -= 1.0;
    }
    score.max(0.0)
}

fn timeline_fit(submitted_on: NaiveDate, closing_date: NaiveDate) -> f64 {
    let days = (closing_date - submitted_on).num_days();
    match days {
        d if d < 0 => 0.0,
        d if d < 21 => 7.0,
        21..=45 => 10.0,
        46..=60 => 7.0,
        61..=90 => 5.0,
        _ => 3.0,
    }
}

fn earnest_money_strength(earnest_money: u64, offer_price: u64) -> f64 {
    if offer_price == 0 {
        return 0.0;
    }
    let percent = earnest_money as f64 * 100.0 / offer_price as f64;
    (percent / 3.0 * 10.0).clamp(0.0, 10.0)
}

fn readiness_docs(financing: FinancingType, version: &OfferVersion) -> f64 {
    let required = if financing.is_financed() {
        DocumentKind::PreApproval
    } else {
        DocumentKind::ProofOfFunds
    };

    let mut score: f64 = 0.0;
    if version.has_document(required) {
        score += 6.0;
    }
    if version.has_document(DocumentKind::Contract) {
        score += 2.0;
    }
    if financing.is_financed() && version.has_document(DocumentKind::ProofOfFunds) {
        score += 2.0;
    }
    score.min(10.0)
}
