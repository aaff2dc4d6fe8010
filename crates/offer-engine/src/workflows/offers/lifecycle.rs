//! Offer lifecycle: the status set, the events that move between statuses, and
//! the transition table every mutating operation is checked against.

use serde::{Deserialize, Serialize};

use super::audit::{AuditEntry, EntityType};
use super::errors::OfferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Draft,
    Submitted,
    UnderReview,
    NeedsClarification,
    RevisionRequested,
    RevisedSubmitted,
    Countered,
    Accepted,
    Declined,
    Expired,
    Withdrawn,
}

impl OfferStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::NeedsClarification => "needs_clarification",
            Self::RevisionRequested => "revision_requested",
            Self::RevisedSubmitted => "revised_submitted",
            Self::Countered => "countered",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Expired => "expired",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Declined | Self::Expired | Self::Withdrawn
        )
    }

    /// Apply `event` to this status, returning the resulting status.
    pub fn apply(self, event: OfferEvent) -> Option<OfferStatus> {
        next_status(Some(self), event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferEvent {
    Submit,
    StartReview,
    RequestClarification,
    RequestRevision,
    Reply,
    Resubmit,
    Counter,
    Accept,
    Decline,
    Withdraw,
    Expire,
}

impl OfferEvent {
    pub const ALL: [OfferEvent; 11] = [
        Self::Submit,
        Self::StartReview,
        Self::RequestClarification,
        Self::RequestRevision,
        Self::Reply,
        Self::Resubmit,
        Self::Counter,
        Self::Accept,
        Self::Decline,
        Self::Withdraw,
        Self::Expire,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::StartReview => "start_review",
            Self::RequestClarification => "request_clarification",
            Self::RequestRevision => "request_revision",
            Self::Reply => "reply",
            Self::Resubmit => "resubmit",
            Self::Counter => "counter",
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::Withdraw => "withdraw",
            Self::Expire => "expire",
        }
    }

    /// Audit action written when this event commits.
    pub const fn action(self) -> &'static str {
        match self {
            Self::Submit => "offer.submitted",
            Self::StartReview => "offer.review_started",
            Self::RequestClarification => "offer.clarification_requested",
            Self::RequestRevision => "offer.revision_requested",
            Self::Reply => "offer.replied",
            Self::Resubmit => "offer.resubmitted",
            Self::Counter => "offer.countered",
            Self::Accept => "offer.accepted",
            Self::Decline => "offer.declined",
            Self::Withdraw => "offer.withdrawn",
            Self::Expire => "offer.expired",
        }
    }

    pub fn from_action(action: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|event| event.action() == action)
    }

    /// Events that carry no payload and go through the generic transition call.
    pub const fn is_review_step(self) -> bool {
        matches!(
            self,
            Self::StartReview
                | Self::RequestClarification
                | Self::RequestRevision
                | Self::Reply
                | Self::Withdraw
        )
    }
}

/// The transition table. `None` as the source means the offer does not exist yet.
pub fn next_status(from: Option<OfferStatus>, event: OfferEvent) -> Option<OfferStatus> {
    use OfferEvent as E;
    use OfferStatus as S;

    match (from, event) {
        (None | Some(S::Draft), E::Submit) => Some(S::Submitted),
        (Some(S::Submitted | S::RevisedSubmitted), E::StartReview) => Some(S::UnderReview),
        (Some(S::UnderReview), E::RequestClarification) => Some(S::NeedsClarification),
        (Some(S::UnderReview), E::RequestRevision) => Some(S::RevisionRequested),
        (Some(S::NeedsClarification), E::Reply) => Some(S::UnderReview),
        (Some(S::RevisionRequested | S::Countered), E::Resubmit) => Some(S::RevisedSubmitted),
        (Some(S::UnderReview | S::RevisedSubmitted), E::Counter) => Some(S::Countered),
        (Some(status), E::Accept) if !status.is_terminal() => Some(S::Accepted),
        (Some(status), E::Decline) if !status.is_terminal() => Some(S::Declined),
        (Some(status), E::Withdraw) if !status.is_terminal() => Some(S::Withdrawn),
        (Some(status), E::Expire) if !status.is_terminal() => Some(S::Expired),
        _ => None,
    }
}

/// Rebuild the status path of one offer from its audit entries.
///
/// Entries that are not lifecycle actions (scoring, contract pushes) are skipped;
/// every lifecycle entry must be a legal step from the status before it and must
/// agree with the `to` status it recorded.
pub fn replay_audit_path(entries: &[AuditEntry]) -> Result<Vec<OfferStatus>, OfferError> {
    let mut ordered: Vec<&AuditEntry> = entries
        .iter()
        .filter(|entry| entry.entity_type == EntityType::Offer)
        .collect();
    ordered.sort_by(|left, right| left.order_key().cmp(&right.order_key()));

    let mut path = Vec::new();
    let mut current: Option<OfferStatus> = None;

    for entry in ordered {
        let Some(event) = OfferEvent::from_action(&entry.action) else {
            continue;
        };

        let next = next_status(current, event).ok_or_else(|| {
            OfferError::InvalidTransition(format!(
                "audit entry {} records {} from {}",
                entry.audit_id,
                event.label(),
                current.map(OfferStatus::label).unwrap_or("nothing"),
            ))
        })?;

        let recorded = entry
            .metadata
            .get("to")
            .and_then(|value| serde_json::from_value::<OfferStatus>(value.clone()).ok());
        if recorded.is_some_and(|status| status != next) {
            return Err(OfferError::InvalidTransition(format!(
                "audit entry {} records status {:?} but the table yields {}",
                entry.audit_id,
                recorded,
                next.label(),
            )));
        }

        path.push(next);
        current = Some(next);
    }

    Ok(path)
}
