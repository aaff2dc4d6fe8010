use serde::{Deserialize, Serialize};

use super::super::errors::OfferError;
use super::super::validation::{validate_score, ValidationError};

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Fixed criterion set every offer is compared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    PriceStrength,
    FinancingCertainty,
    ContingencyRisk,
    TimelineFit,
    EarnestMoneyStrength,
    BuyerReadinessDocs,
    Other,
}

impl Criterion {
    pub const ALL: [Criterion; 7] = [
        Self::PriceStrength,
        Self::FinancingCertainty,
        Self::ContingencyRisk,
        Self::TimelineFit,
        Self::EarnestMoneyStrength,
        Self::BuyerReadinessDocs,
        Self::Other,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::PriceStrength => "price_strength",
            Self::FinancingCertainty => "financing_certainty",
            Self::ContingencyRisk => "contingency_risk",
            Self::TimelineFit => "timeline_fit",
            Self::EarnestMoneyStrength => "earnest_money_strength",
            Self::BuyerReadinessDocs => "buyer_readiness_docs",
            Self::Other => "other",
        }
    }
}

/// One number per criterion; used for both raw scores and weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CriterionValues {
    pub price_strength: f64,
    pub financing_certainty: f64,
    pub contingency_risk: f64,
    pub timeline_fit: f64,
    pub earnest_money_strength: f64,
    pub buyer_readiness_docs: f64,
    pub other: f64,
}

impl CriterionValues {
    pub fn get(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::PriceStrength => self.price_strength,
            Criterion::FinancingCertainty => self.financing_certainty,
            Criterion::ContingencyRisk => self.contingency_risk,
            Criterion::TimelineFit => self.timeline_fit,
            Criterion::EarnestMoneyStrength => self.earnest_money_strength,
            Criterion::BuyerReadinessDocs => self.buyer_readiness_docs,
            Criterion::Other => self.other,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Criterion, f64)> + '_ {
        Criterion::ALL
            .into_iter()
            .map(move |criterion| (criterion, self.get(criterion)))
    }

    pub fn sum(&self) -> f64 {
        self.iter().map(|(_, value)| value).sum()
    }

    /// Every criterion score must sit in 0..=10.
    pub fn validate_scores(&self) -> Result<(), ValidationError> {
        self.iter()
            .try_for_each(|(criterion, value)| validate_score(criterion.label(), value))
    }
}

/// Weighted-criteria rubric. Weights are non-negative and sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringRubric {
    pub weights: CriterionValues,
}

impl ScoringRubric {
    pub fn new(weights: CriterionValues) -> Result<Self, OfferError> {
        let rubric = Self { weights };
        rubric.validate()?;
        Ok(rubric)
    }

    pub fn validate(&self) -> Result<(), OfferError> {
        for (criterion, weight) in self.weights.iter() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(OfferError::InvalidRubric(format!(
                    "{} weight {weight} must be a non-negative number",
                    criterion.label()
                )));
            }
        }

        let total = self.weights.sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(OfferError::InvalidRubric(format!(
                "weights sum to {total}, expected 1.0"
            )));
        }
        Ok(())
    }

    /// Weighted sum of `scores`, clamped into 0..=10 against float drift.
    pub fn apply(&self, scores: &CriterionValues) -> f64 {
        let total: f64 = scores
            .iter()
            .map(|(criterion, score)| score * self.weights.get(criterion))
            .sum();
        total.clamp(0.0, 10.0)
    }
}

impl Default for ScoringRubric {
    fn default() -> Self {
        Self {
            weights: CriterionValues {
                price_strength: 0.3,
                financing_certainty: 0.3,
                contingency_risk: 0.2,
                timeline_fit: 0.1,
                earnest_money_strength: 0.05,
                buyer_readiness_docs: 0.05,
                other: 0.0,
            },
        }
    }
}
