use super::common::*;
use chrono::Duration;
use serde_json::json;

use crate::workflows::offers::{
    replay_audit_path, ActorRole, AuditEntry, AuditQuery, EntityType, OfferError, OfferEvent,
    OfferId, OfferRevision, OfferStatus, ValidationError,
};

#[tokio::test]
async fn submission_creates_first_version_and_audit_entry() {
    let harness = harness();
    harness.listed().await;

    let offer = harness.submitted(9_100_000).await;
    assert_eq!(offer.status, OfferStatus::Submitted);
    assert_eq!(offer.current_version_number, 1);
    assert_eq!(offer.current_version_id.as_str(), "OFF-000001-v1");

    let versions = harness.service.versions(&offer.offer_id).expect("versions");
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].documents.len(), 2);
    assert_eq!(versions[0].documents[0].uploaded_by_user_id, "agent-7");

    let entries = harness
        .service
        .query_audit(&AuditQuery::for_entity(EntityType::Offer, offer.offer_id.as_str()))
        .expect("audit");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "offer.submitted");
    assert_eq!(entries[0].metadata["version_id"], json!("OFF-000001-v1"));
    assert_eq!(entries[0].ip_address, "203.0.113.7");
    assert_eq!(entries[0].actor_role, ActorRole::BuyerAgent);
}

#[tokio::test]
async fn request_revision_on_submitted_offer_is_rejected_without_side_effects() {
    let harness = harness();
    harness.listed().await;
    let offer = harness.submitted(9_000_000).await;

    let err = harness
        .service
        .transition(&reviewer(), &offer.offer_id, review(OfferEvent::RequestRevision))
        .await
        .expect_err("revision needs review first");
    assert!(matches!(err, OfferError::InvalidTransition(_)));

    let stored = harness.service.offer(&offer.offer_id).expect("offer");
    assert_eq!(stored.status, OfferStatus::Submitted);
    assert_eq!(stored.revision, offer.revision);
    let entries = harness
        .service
        .query_audit(&AuditQuery::for_entity(EntityType::Offer, offer.offer_id.as_str()))
        .expect("audit");
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn audit_trail_reconstructs_the_full_review_path() {
    let harness = harness();
    harness.listed().await;
    let offer = harness.under_review(8_800_000).await;
    let id = offer.offer_id.clone();
    let service = &harness.service;

    service
        .transition(&reviewer(), &id, review(OfferEvent::RequestRevision))
        .await
        .expect("revision requested");
    let revised = service
        .resubmit_offer(
            &agent(),
            &id,
            OfferRevision {
                terms: terms(8_950_000),
                documents: submission(8_950_000).documents,
            },
        )
        .await
        .expect("resubmitted");
    assert_eq!(revised.status, OfferStatus::RevisedSubmitted);
    assert_eq!(revised.current_version_id.as_str(), "OFF-000001-v2");
    assert_eq!(revised.terms.offer_price, 8_950_000);

    service
        .transition(&reviewer(), &id, review(OfferEvent::StartReview))
        .await
        .expect("second review");
    service
        .transition(&reviewer(), &id, review(OfferEvent::RequestClarification))
        .await
        .expect("clarification");
    service
        .transition(&agent(), &id, review(OfferEvent::Reply))
        .await
        .expect("reply");
    let withdrawn = service
        .transition(&agent(), &id, review(OfferEvent::Withdraw))
        .await
        .expect("withdraw");
    assert_eq!(withdrawn.status, OfferStatus::Withdrawn);

    let versions = service.versions(&id).expect("versions");
    let highest = versions
        .iter()
        .max_by_key(|version| version.version_number)
        .expect("at least one version");
    assert_eq!(withdrawn.current_version_id, highest.version_id);
    assert_eq!(versions.len(), 2);

    let path = service.audit_path(&id).expect("replay");
    assert_eq!(
        path,
        vec![
            OfferStatus::Submitted,
            OfferStatus::UnderReview,
            OfferStatus::RevisionRequested,
            OfferStatus::RevisedSubmitted,
            OfferStatus::UnderReview,
            OfferStatus::NeedsClarification,
            OfferStatus::UnderReview,
            OfferStatus::Withdrawn,
        ]
    );

    let err = service
        .transition(&agent(), &id, review(OfferEvent::Withdraw))
        .await
        .expect_err("terminal");
    assert!(matches!(err, OfferError::InvalidTransition(_)));
}

#[tokio::test]
async fn decision_events_cannot_use_the_generic_transition() {
    let harness = harness();
    harness.listed().await;
    let offer = harness.under_review(9_000_000).await;

    let err = harness
        .service
        .transition(&seller(), &offer.offer_id, review(OfferEvent::Accept))
        .await
        .expect_err("accept needs authorization");
    assert!(matches!(
        err,
        OfferError::Validation(ValidationError::UnsupportedEvent("accept"))
    ));
}

#[tokio::test]
async fn unknown_offer_is_not_found() {
    let harness = harness();
    harness.listed().await;
    let err = harness
        .service
        .transition(
            &reviewer(),
            &OfferId::new("OFF-999999"),
            review(OfferEvent::StartReview),
        )
        .await
        .expect_err("missing offer");
    assert!(matches!(err, OfferError::NotFound { entity: "offer", .. }));
}

#[tokio::test]
async fn invalid_terms_are_rejected_before_anything_is_written() {
    let harness = harness();
    harness.listed().await;
    let mut submission = submission(9_000_000);
    submission.terms.escalation.enabled = true;
    submission.terms.escalation.cap_price = Some(9_500_000);

    let err = harness
        .service
        .submit_offer(&agent(), submission)
        .await
        .expect_err("incomplete escalation");
    assert!(matches!(
        err,
        OfferError::Validation(ValidationError::EscalationIncomplete)
    ));
    assert!(harness
        .service
        .offers_for_property(&crate::workflows::offers::PropertyId::new(PROPERTY_ID))
        .expect("offers")
        .is_empty());
}

#[tokio::test]
async fn passing_the_deadline_expires_offers_lazily_and_blocks_submissions() {
    let harness = harness();
    harness
        .service
        .register_property(&reviewer(), listing(Some(start() + Duration::hours(4))))
        .await
        .expect("property");
    let offer = harness.under_review(9_000_000).await;

    harness.clock.advance(Duration::hours(5));

    let err = harness
        .service
        .transition(&reviewer(), &offer.offer_id, review(OfferEvent::RequestRevision))
        .await
        .expect_err("deadline passed");
    assert!(matches!(err, OfferError::InvalidTransition(_)));
    let stored = harness.service.offer(&offer.offer_id).expect("offer");
    assert_eq!(stored.status, OfferStatus::Expired);

    let expired_entry = harness
        .service
        .query_audit(&AuditQuery {
            action: Some("offer.expired".to_string()),
            ..AuditQuery::default()
        })
        .expect("audit");
    assert_eq!(expired_entry.len(), 1);
    assert_eq!(expired_entry[0].actor_role, ActorRole::System);

    let late = harness
        .service
        .submit_offer(&agent(), submission(9_200_000))
        .await
        .expect_err("late submission");
    assert!(matches!(late, OfferError::InvalidTransition(_)));
}

#[tokio::test]
async fn sweep_expires_every_overdue_offer_once() {
    let harness = harness();
    harness
        .service
        .register_property(&reviewer(), listing(Some(start() + Duration::days(1))))
        .await
        .expect("property");
    let first = harness.submitted(8_900_000).await;
    let second = harness.under_review(9_000_000).await;

    assert!(harness
        .service
        .expire_overdue(&crate::workflows::offers::RequestContext::system())
        .await
        .expect("sweep")
        .is_empty());

    harness.clock.advance(Duration::days(2));
    let expired = harness
        .service
        .expire_overdue(&crate::workflows::offers::RequestContext::system())
        .await
        .expect("sweep");
    assert_eq!(expired, vec![first.offer_id.clone(), second.offer_id.clone()]);

    let again = harness
        .service
        .expire_overdue(&crate::workflows::offers::RequestContext::system())
        .await
        .expect("sweep");
    assert!(again.is_empty());
    assert_eq!(
        harness.service.audit_path(&second.offer_id).expect("path"),
        vec![
            OfferStatus::Submitted,
            OfferStatus::UnderReview,
            OfferStatus::Expired
        ]
    );
}

#[test]
fn replay_rejects_entries_outside_the_transition_table() {
    let at = start();
    let entry = |id: &str, action: &str, to: &str| AuditEntry {
        audit_id: id.to_string(),
        actor_user_id: "agent-7".to_string(),
        actor_role: ActorRole::BuyerAgent,
        action: action.to_string(),
        entity_type: EntityType::Offer,
        entity_id: "OFF-000001".to_string(),
        metadata: json!({ "to": to }),
        ip_address: "127.0.0.1".to_string(),
        created_at: at,
    };

    let valid = [
        entry("AUD-000001", "offer.submitted", "submitted"),
        entry("AUD-000002", "offer.scored", "ignored"),
        entry("AUD-000003", "offer.review_started", "under_review"),
    ];
    assert_eq!(
        replay_audit_path(&valid).expect("valid path"),
        vec![OfferStatus::Submitted, OfferStatus::UnderReview]
    );

    let skipped_review = [
        entry("AUD-000001", "offer.submitted", "submitted"),
        entry("AUD-000002", "offer.replied", "under_review"),
    ];
    assert!(matches!(
        replay_audit_path(&skipped_review),
        Err(OfferError::InvalidTransition(_))
    ));

    let mislabelled = [entry("AUD-000001", "offer.submitted", "under_review")];
    assert!(replay_audit_path(&mislabelled).is_err());
}
