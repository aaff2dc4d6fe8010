use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::OfferId;
use super::super::lifecycle::OfferStatus;

/// One row of a property's offer ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedOffer {
    pub rank: usize,
    pub offer_id: OfferId,
    pub status: OfferStatus,
    pub offer_price: u64,
    pub effective_score: Option<f64>,
    pub computed_score: Option<f64>,
    pub manual_override_score: Option<f64>,
    pub submitted_at: DateTime<Utc>,
}

/// Order by effective score descending, then earliest current-version
/// submission, then offer id. Unscored offers sort after every scored one.
pub fn rank(mut rows: Vec<RankedOffer>) -> Vec<RankedOffer> {
    rows.sort_by(compare);
    for (index, row) in rows.iter_mut().enumerate() {
        row.rank = index + 1;
    }
    rows
}

fn compare(left: &RankedOffer, right: &RankedOffer) -> Ordering {
    let by_score = match (left.effective_score, right.effective_score) {
        (Some(l), Some(r)) => r.total_cmp(&l),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_score
        .then_with(|| left.submitted_at.cmp(&right.submitted_at))
        .then_with(|| left.offer_id.cmp(&right.offer_id))
}
