mod heuristics;
mod ranking;
mod rubric;

pub use ranking::{rank, RankedOffer};
pub use rubric::{Criterion, CriterionValues, ScoringRubric};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Offer, OfferId, OfferVersion, Property};
use super::errors::OfferError;
use super::validation::validate_score;
use heuristics::{derive_criteria, HeuristicInputs};

/// Reviewer input for scoring. Missing criteria fall back to the heuristic,
/// a missing rubric to the engine default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    #[serde(default)]
    pub criteria: Option<CriterionValues>,
    #[serde(default)]
    pub rubric: Option<ScoringRubric>,
    #[serde(default)]
    pub manual_override_score: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Reviewer,
    Heuristic,
}

/// The single current score of an offer; replaced in place on re-score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferScore {
    pub offer_id: OfferId,
    pub version_id: String,
    pub criteria: CriterionValues,
    pub weights: CriterionValues,
    pub computed_score: f64,
    pub manual_override_score: Option<f64>,
    pub notes: Option<String>,
    pub source: ScoreSource,
    pub scored_by_user_id: String,
    pub scored_at: DateTime<Utc>,
}

impl OfferScore {
    /// Score used for display and ranking.
    pub fn effective_score(&self) -> f64 {
        self.manual_override_score.unwrap_or(self.computed_score)
    }
}

/// Weighted score of `criteria` under `rubric`.
pub fn compute_score(criteria: &CriterionValues, rubric: &ScoringRubric) -> Result<f64, OfferError> {
    rubric.validate()?;
    criteria.validate_scores()?;
    Ok(rubric.apply(criteria))
}

/// Stateless evaluator applying a rubric to an offer's current version.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    default_rubric: ScoringRubric,
}

impl ScoringEngine {
    pub fn new(default_rubric: ScoringRubric) -> Result<Self, OfferError> {
        default_rubric.validate()?;
        Ok(Self { default_rubric })
    }

    pub fn default_rubric(&self) -> &ScoringRubric {
        &self.default_rubric
    }

    pub fn score(
        &self,
        offer: &Offer,
        property: &Property,
        version: &OfferVersion,
        request: &ScoreRequest,
        scorer_user_id: &str,
        scored_at: DateTime<Utc>,
    ) -> Result<OfferScore, OfferError> {
        let rubric = request.rubric.unwrap_or(self.default_rubric);

        let (criteria, source) = match request.criteria {
            Some(criteria) => (criteria, ScoreSource::Reviewer),
            None => {
                let inputs = HeuristicInputs {
                    terms: &offer.terms,
                    property,
                    version,
                };
                (derive_criteria(&inputs), ScoreSource::Heuristic)
            }
        };

        let computed_score = compute_score(&criteria, &rubric)?;
        if let Some(manual) = request.manual_override_score {
            validate_score("manual_override_score", manual)?;
        }

        Ok(OfferScore {
            offer_id: offer.offer_id.clone(),
            version_id: version.version_id.to_string(),
            criteria,
            weights: rubric.weights,
            computed_score,
            manual_override_score: request.manual_override_score,
            notes: request.notes.clone(),
            source,
            scored_by_user_id: scorer_user_id.to_string(),
            scored_at,
        })
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self {
            default_rubric: ScoringRubric::default(),
        }
    }
}
