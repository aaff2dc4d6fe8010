use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::audit::{AuditEntry, AuditQuery, AuditTrail, EntityType};
use super::authorization::{AuthorizationGuard, AuthorizationLevel};
use super::clock::{Clock, SystemClock};
use super::decision::{
    DecisionCommand, DecisionPayload, DecisionReceipt, DecisionRequest, DeclineReason,
    SellerDecision,
};
use super::domain::{
    Document, DocumentUpload, NewProperty, Offer, OfferId, OfferRevision, OfferSubmission,
    OfferVersion, Property, PropertyId, RequestContext, VersionId,
};
use super::errors::OfferError;
use super::ids::{compare_sequence_ids, IdSequence};
use super::integration::{
    ContractGateway, ContractPayload, ContractPush, IntegrationError, IntegrationStatus,
    PushStatus, RetryPolicy, TransactionSpaceId,
};
use super::lifecycle::{next_status, replay_audit_path, OfferEvent, OfferStatus};
use super::locks::LockTable;
use super::scoring::{rank, OfferScore, RankedOffer, ScoreRequest, ScoringEngine, ScoringRubric};
use super::store::{RecordStore, RecordStoreExt, StoreError};
use super::validation::{
    validate_counter_terms, validate_documents, validate_property, validate_terms,
    ValidationError,
};

pub const PUSH_ACTION: &str = "smart.push_contract";
const PROPERTY_REGISTERED_ACTION: &str = "property.registered";
const SCORED_ACTION: &str = "offer.scored";

/// Engine-level knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub rubric: ScoringRubric,
    pub push_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rubric: ScoringRubric::default(),
            push_timeout: Duration::from_millis(5_000),
            retry: RetryPolicy::default(),
        }
    }
}

/// Review-step request. Payload-carrying events have their own operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub event: OfferEvent,
    #[serde(default)]
    pub note: Option<String>,
}

/// Everything a reviewer needs about one offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferStatusView {
    pub offer: Offer,
    pub current_version: OfferVersion,
    pub score: Option<OfferScore>,
    pub effective_score: Option<f64>,
    pub latest_decision: Option<SellerDecision>,
    pub contract_push: Option<ContractPush>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySummary {
    pub attempted: usize,
    pub confirmed: usize,
    pub rescheduled: usize,
    pub failed: usize,
}

struct Sequences {
    property: IdSequence,
    offer: IdSequence,
    decision: IdSequence,
    push: IdSequence,
    document: IdSequence,
}

impl Sequences {
    fn resume<S: RecordStore>(store: &S) -> Result<Self, StoreError> {
        let properties = store.list::<Property>(|_| true)?;
        let offers = store.list::<Offer>(|_| true)?;
        let versions = store.list::<OfferVersion>(|_| true)?;
        let decisions = store.list::<SellerDecision>(|_| true)?;
        let pushes = store.list::<ContractPush>(|_| true)?;

        Ok(Self {
            property: IdSequence::resume(
                "PROP",
                properties.iter().map(|property| property.property_id.as_str()),
            ),
            offer: IdSequence::resume("OFF", offers.iter().map(|offer| offer.offer_id.as_str())),
            decision: IdSequence::resume(
                "DEC",
                decisions.iter().map(|decision| decision.decision_id.as_str()),
            ),
            push: IdSequence::resume("PUSH", pushes.iter().map(|push| push.push_id.as_str())),
            document: IdSequence::resume(
                "DOC",
                versions.iter().flat_map(|version| {
                    version
                        .documents
                        .iter()
                        .map(|document| document.document_id.as_str())
                }),
            ),
        })
    }
}

/// Outcome of the locked part of an acceptance.
struct AcceptanceCommit {
    decision: SellerDecision,
    offer: Offer,
    cascade_declined: Vec<OfferId>,
    push: ContractPush,
}

/// Service composing the record store, audit trail, scoring engine,
/// authorization guard and contract gateway.
pub struct OfferTransactionService<S, G> {
    store: Arc<S>,
    gateway: Arc<G>,
    audit: AuditTrail<S>,
    scoring: ScoringEngine,
    guard: AuthorizationGuard,
    locks: LockTable,
    clock: Arc<dyn Clock>,
    ids: Sequences,
    config: EngineConfig,
}

impl<S, G> OfferTransactionService<S, G>
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    pub fn new(store: Arc<S>, gateway: Arc<G>, config: EngineConfig) -> Result<Self, OfferError> {
        Self::with_clock(store, gateway, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<S>,
        gateway: Arc<G>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, OfferError> {
        let scoring = ScoringEngine::new(config.rubric)?;
        let ids = Sequences::resume(store.as_ref())?;
        let audit = AuditTrail::open(store.clone(), clock.clone())?;

        Ok(Self {
            store,
            gateway,
            audit,
            scoring,
            guard: AuthorizationGuard::new(),
            locks: LockTable::new(),
            clock,
            ids,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Register a listing. Properties are immutable afterwards.
    pub async fn register_property(
        &self,
        context: &RequestContext,
        new_property: NewProperty,
    ) -> Result<Property, OfferError> {
        validate_property(&new_property)?;

        let property_id = match new_property.property_id.as_deref() {
            Some(id) => PropertyId::new(id.trim()),
            None => PropertyId::new(self.ids.property.next_id()),
        };
        let _guard = self.locks.property(&property_id).await?;

        if self.store.get::<Property>(property_id.as_str())?.is_some() {
            return Err(ValidationError::DuplicateProperty(property_id.to_string()).into());
        }
        self.ids.property.observe([property_id.as_str()]);

        let now = self.clock.now();
        let property = Property {
            property_id,
            address: new_property.address.trim().to_string(),
            mls_number: new_property.mls_number.trim().to_string(),
            listing_price: new_property.listing_price,
            listing_agent: new_property.listing_agent,
            offer_deadline: new_property.offer_deadline,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert(&property)?;
        self.audit.record(
            context,
            PROPERTY_REGISTERED_ACTION,
            EntityType::Property,
            property.property_id.as_str(),
            json!({
                "mls_number": property.mls_number,
                "listing_price": property.listing_price,
                "offer_deadline": property.offer_deadline,
            }),
        )?;

        info!(property_id = %property.property_id, "property registered");
        Ok(property)
    }

    /// Create an offer and its first version.
    pub async fn submit_offer(
        &self,
        context: &RequestContext,
        submission: OfferSubmission,
    ) -> Result<Offer, OfferError> {
        validate_terms(&submission.terms)?;
        validate_documents(&submission.documents)?;

        let property = self.load_property(&submission.property_id)?;
        let _guard = self.locks.property(&property.property_id).await?;

        let now = self.clock.now();
        if property.deadline_passed(now) {
            return Err(OfferError::InvalidTransition(format!(
                "offer deadline for property {} has passed",
                property.property_id
            )));
        }
        let accepted = self.store.list::<Offer>(|offer| {
            offer.property_id == property.property_id && offer.status == OfferStatus::Accepted
        })?;
        if let Some(accepted) = accepted.first() {
            return Err(OfferError::InvalidTransition(format!(
                "property {} already accepted offer {}",
                property.property_id, accepted.offer_id
            )));
        }

        let status = next_status(None, OfferEvent::Submit).ok_or_else(|| {
            OfferError::InvalidTransition("submission is not a legal first step".to_string())
        })?;

        let offer_id = OfferId::new(self.ids.offer.next_id());
        let version = OfferVersion {
            version_id: VersionId::for_offer(&offer_id, 1),
            offer_id: offer_id.clone(),
            version_number: 1,
            payload: submission.terms.clone(),
            documents: self.attach_documents(context, &submission.documents, now),
            submitted_by_user_id: context.actor.user_id.clone(),
            submitted_at: now,
        };
        self.store.upsert(&version)?;

        let offer = Offer {
            offer_id,
            property_id: property.property_id.clone(),
            status,
            current_version_id: version.version_id.clone(),
            current_version_number: version.version_number,
            submitted_by_agent_id: context.actor.user_id.clone(),
            terms: submission.terms,
            created_at: now,
            updated_at: now,
            revision: 1,
        };
        self.store.upsert(&offer)?;

        self.audit.record(
            context,
            OfferEvent::Submit.action(),
            EntityType::Offer,
            offer.offer_id.as_str(),
            transition_metadata(
                None,
                status,
                &offer.current_version_id,
                json!({
                    "property_id": offer.property_id,
                    "offer_price": offer.terms.offer_price,
                    "documents": version.documents.len(),
                }),
            ),
        )?;

        info!(
            offer_id = %offer.offer_id,
            property_id = %offer.property_id,
            offer_price = offer.terms.offer_price,
            "offer submitted"
        );
        Ok(offer)
    }

    /// Apply a review step (start_review, request_clarification,
    /// request_revision, reply, withdraw).
    pub async fn transition(
        &self,
        context: &RequestContext,
        offer_id: &OfferId,
        request: TransitionRequest,
    ) -> Result<Offer, OfferError> {
        if !request.event.is_review_step() {
            return Err(ValidationError::UnsupportedEvent(request.event.label()).into());
        }
        self.load_offer(offer_id)?;

        let _guard = self.locks.offer(offer_id).await?;
        self.retry_on_conflict(offer_id, || {
            let now = self.clock.now();
            let offer = self.load_offer(offer_id)?;
            let property = self.load_property(&offer.property_id)?;
            self.expire_if_overdue(context, &offer, &property, now)?;

            let from = offer.status;
            let next = legal_next(&offer, request.event)?;
            let mut updated = offer.clone();
            updated.status = next;
            let committed = self.commit_offer(offer.revision, updated, now)?;

            self.audit.record(
                context,
                request.event.action(),
                EntityType::Offer,
                committed.offer_id.as_str(),
                transition_metadata(
                    Some(from),
                    next,
                    &committed.current_version_id,
                    json!({ "note": request.note }),
                ),
            )?;
            info!(
                offer_id = %committed.offer_id,
                action = request.event.action(),
                status = next.label(),
                "offer transitioned"
            );
            Ok(committed)
        })
    }

    /// Buyer's new terms after a revision request or a counter.
    pub async fn resubmit_offer(
        &self,
        context: &RequestContext,
        offer_id: &OfferId,
        revision: OfferRevision,
    ) -> Result<Offer, OfferError> {
        validate_terms(&revision.terms)?;
        validate_documents(&revision.documents)?;
        self.load_offer(offer_id)?;

        let _guard = self.locks.offer(offer_id).await?;
        self.retry_on_conflict(offer_id, || {
            let now = self.clock.now();
            let offer = self.load_offer(offer_id)?;
            let property = self.load_property(&offer.property_id)?;
            self.expire_if_overdue(context, &offer, &property, now)?;

            let from = offer.status;
            let next = legal_next(&offer, OfferEvent::Resubmit)?;
            self.check_revision(offer_id, offer.revision)?;

            let version_number = offer.current_version_number + 1;
            let version = OfferVersion {
                version_id: VersionId::for_offer(offer_id, version_number),
                offer_id: offer_id.clone(),
                version_number,
                payload: revision.terms.clone(),
                documents: self.attach_documents(context, &revision.documents, now),
                submitted_by_user_id: context.actor.user_id.clone(),
                submitted_at: now,
            };
            self.store.upsert(&version)?;

            let mut updated = offer.clone();
            updated.status = next;
            updated.terms = revision.terms.clone();
            updated.current_version_id = version.version_id.clone();
            updated.current_version_number = version_number;
            let committed = self.commit_offer(offer.revision, updated, now)?;

            self.audit.record(
                context,
                OfferEvent::Resubmit.action(),
                EntityType::Offer,
                committed.offer_id.as_str(),
                transition_metadata(
                    Some(from),
                    next,
                    &committed.current_version_id,
                    json!({
                        "version_number": version_number,
                        "offer_price": committed.terms.offer_price,
                    }),
                ),
            )?;
            info!(
                offer_id = %committed.offer_id,
                version_id = %committed.current_version_id,
                "offer resubmitted"
            );
            Ok(committed)
        })
    }

    /// Score (or re-score) a non-terminal offer, replacing any previous score.
    pub async fn score_offer(
        &self,
        context: &RequestContext,
        offer_id: &OfferId,
        request: ScoreRequest,
    ) -> Result<OfferScore, OfferError> {
        self.load_offer(offer_id)?;
        let _guard = self.locks.offer(offer_id).await?;

        self.retry_on_conflict(offer_id, || {
            let now = self.clock.now();
            let offer = self.load_offer(offer_id)?;
            let property = self.load_property(&offer.property_id)?;
            self.expire_if_overdue(context, &offer, &property, now)?;
            if offer.status.is_terminal() {
                return Err(OfferError::InvalidTransition(format!(
                    "offer {} is {} and can no longer be scored",
                    offer.offer_id,
                    offer.status.label()
                )));
            }

            let version = self.load_version(&offer.current_version_id)?;
            let score = self.scoring.score(
                &offer,
                &property,
                &version,
                &request,
                &context.actor.user_id,
                now,
            )?;
            self.store.upsert(&score)?;

            self.audit.record(
                context,
                SCORED_ACTION,
                EntityType::OfferScore,
                offer.offer_id.as_str(),
                json!({
                    "version_id": score.version_id,
                    "computed_score": score.computed_score,
                    "manual_override_score": score.manual_override_score,
                    "effective_score": score.effective_score(),
                    "source": score.source,
                }),
            )?;
            debug!(
                offer_id = %offer.offer_id,
                computed_score = score.computed_score,
                "offer scored"
            );
            Ok(score)
        })
    }

    /// Rank every offer on a property by effective score.
    pub fn rank_offers(&self, property_id: &PropertyId) -> Result<Vec<RankedOffer>, OfferError> {
        self.load_property(property_id)?;
        let offers = self
            .store
            .list::<Offer>(|offer| &offer.property_id == property_id)?;

        let mut rows = Vec::with_capacity(offers.len());
        for offer in offers {
            let version = self.load_version(&offer.current_version_id)?;
            let score = self.store.get::<OfferScore>(offer.offer_id.as_str())?;
            rows.push(RankedOffer {
                rank: 0,
                offer_id: offer.offer_id,
                status: offer.status,
                offer_price: offer.terms.offer_price,
                effective_score: score.as_ref().map(OfferScore::effective_score),
                computed_score: score.as_ref().map(|score| score.computed_score),
                manual_override_score: score.and_then(|score| score.manual_override_score),
                submitted_at: version.submitted_at,
            });
        }
        Ok(rank(rows))
    }

    /// Record a seller decision. Acceptance cascades declines onto sibling
    /// offers and pushes the contract once every lock is released.
    pub async fn decide(
        &self,
        context: &RequestContext,
        offer_id: &OfferId,
        request: DecisionRequest,
    ) -> Result<DecisionReceipt, OfferError> {
        match request.decision {
            DecisionCommand::Accept => self.accept(context, offer_id, &request).await,
            DecisionCommand::Decline { .. } | DecisionCommand::Counter { .. } => {
                self.decide_single(context, offer_id, request).await
            }
        }
    }

    async fn accept(
        &self,
        context: &RequestContext,
        offer_id: &OfferId,
        request: &DecisionRequest,
    ) -> Result<DecisionReceipt, OfferError> {
        // Unlocked read to find the property; everything is re-read under the locks.
        let initial = self.load_offer(offer_id)?;
        let property_id = initial.property_id;

        let property_guard = self.locks.property(&property_id).await?;
        let mut sibling_ids: Vec<OfferId> = self
            .store
            .list::<Offer>(|offer| offer.property_id == property_id)?
            .into_iter()
            .map(|offer| offer.offer_id)
            .collect();
        sibling_ids.sort();
        let offer_guards = self.locks.offers(&sibling_ids).await?;

        let commit = self.commit_acceptance(context, offer_id, &property_id, &sibling_ids, request)?;
        let push_guard = self.locks.push(&commit.push.push_id).await?;

        drop(offer_guards);
        drop(property_guard);

        let stored = self
            .store
            .get::<ContractPush>(&commit.push.push_id)?
            .unwrap_or(commit.push);
        let push = if stored.status == PushStatus::Pending && stored.attempts == 0 {
            self.deliver(context, stored).await?
        } else {
            info!(
                push_id = %stored.push_id,
                attempts = stored.attempts,
                status = stored.status.label(),
                "contract push already handled by the retry sweep"
            );
            stored
        };
        drop(push_guard);

        Ok(DecisionReceipt {
            decision_recorded: true,
            decision: commit.decision,
            offer: commit.offer,
            cascade_declined: commit.cascade_declined,
            integration: push.integration_status(),
        })
    }

    fn commit_acceptance(
        &self,
        context: &RequestContext,
        offer_id: &OfferId,
        property_id: &PropertyId,
        sibling_ids: &[OfferId],
        request: &DecisionRequest,
    ) -> Result<AcceptanceCommit, OfferError> {
        let (decision, accepted, property, version) = self.retry_on_conflict(offer_id, || {
            let now = self.clock.now();
            let offer = self.load_offer(offer_id)?;
            let property = self.load_property(property_id)?;
            self.expire_if_overdue(context, &offer, &property, now)?;

            let from = offer.status;
            let next = legal_next(&offer, OfferEvent::Accept)?;
            let authorization = self.guard.check(
                AuthorizationLevel::Full,
                &request.consents,
                &request.esign,
                &context.ip_address,
                now,
            )?;
            self.check_revision(offer_id, offer.revision)?;

            let version = self.load_version(&offer.current_version_id)?;
            let decision = SellerDecision {
                decision_id: self.ids.decision.next_id(),
                offer_id: offer.offer_id.clone(),
                property_id: offer.property_id.clone(),
                version_id: offer.current_version_id.to_string(),
                decided_by_user_id: context.actor.user_id.clone(),
                decision: DecisionPayload::Accept,
                authorization: Some(authorization),
                decided_at: now,
            };
            self.store.upsert(&decision)?;

            let mut updated = offer.clone();
            updated.status = next;
            let accepted = self.commit_offer(offer.revision, updated, now)?;

            self.audit.record(
                context,
                OfferEvent::Accept.action(),
                EntityType::Offer,
                accepted.offer_id.as_str(),
                transition_metadata(
                    Some(from),
                    next,
                    &accepted.current_version_id,
                    json!({ "decision_id": decision.decision_id }),
                ),
            )?;
            info!(
                offer_id = %accepted.offer_id,
                property_id = %accepted.property_id,
                decision_id = %decision.decision_id,
                "offer accepted"
            );
            Ok((decision, accepted, property, version))
        })?;

        let mut cascade_declined = Vec::new();
        for sibling_id in sibling_ids.iter().filter(|id| *id != offer_id) {
            if let Some(declined) = self.cascade_decline(context, sibling_id, &accepted)? {
                cascade_declined.push(declined.offer_id);
            }
        }
        if !cascade_declined.is_empty() {
            info!(
                offer_id = %accepted.offer_id,
                declined = cascade_declined.len(),
                "declined sibling offers after acceptance"
            );
        }

        let now = self.clock.now();
        let payload =
            ContractPayload::build(&property, &accepted, &version, &decision.decision_id, now);
        let push = ContractPush {
            push_id: self.ids.push.next_id(),
            offer_id: accepted.offer_id.clone(),
            property_id: accepted.property_id.clone(),
            decision_id: decision.decision_id.clone(),
            payload_hash: payload.payload_hash(),
            payload,
            status: PushStatus::Pending,
            attempts: 0,
            // Held back from the retry sweep while the acceptance delivers it.
            next_attempt_at: Some(now + chrono_delay(self.config.push_timeout)),
            transaction_space_id: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert(&push)?;

        Ok(AcceptanceCommit {
            decision,
            offer: accepted,
            cascade_declined,
            push,
        })
    }

    fn cascade_decline(
        &self,
        context: &RequestContext,
        sibling_id: &OfferId,
        accepted: &Offer,
    ) -> Result<Option<Offer>, OfferError> {
        let system = context.as_system();
        self.retry_on_conflict(sibling_id, || {
            let now = self.clock.now();
            let offer = self.load_offer(sibling_id)?;
            if offer.status.is_terminal() {
                return Ok(None);
            }
            let from = offer.status;
            let next = legal_next(&offer, OfferEvent::Decline)?;
            self.check_revision(sibling_id, offer.revision)?;

            let decision = SellerDecision {
                decision_id: self.ids.decision.next_id(),
                offer_id: offer.offer_id.clone(),
                property_id: offer.property_id.clone(),
                version_id: offer.current_version_id.to_string(),
                decided_by_user_id: system.actor.user_id.clone(),
                decision: DecisionPayload::Decline {
                    reason: DeclineReason::Cascade {
                        accepted_offer_id: accepted.offer_id.clone(),
                    },
                },
                authorization: None,
                decided_at: now,
            };
            self.store.upsert(&decision)?;

            let mut updated = offer.clone();
            updated.status = next;
            let declined = self.commit_offer(offer.revision, updated, now)?;

            self.audit.record(
                &system,
                OfferEvent::Decline.action(),
                EntityType::Offer,
                declined.offer_id.as_str(),
                transition_metadata(
                    Some(from),
                    next,
                    &declined.current_version_id,
                    json!({
                        "decision_id": decision.decision_id,
                        "cascade_from": accepted.offer_id,
                    }),
                ),
            )?;
            Ok(Some(declined))
        })
    }

    async fn decide_single(
        &self,
        context: &RequestContext,
        offer_id: &OfferId,
        request: DecisionRequest,
    ) -> Result<DecisionReceipt, OfferError> {
        self.load_offer(offer_id)?;
        let _guard = self.locks.offer(offer_id).await?;

        let (decision, offer) = self.retry_on_conflict(offer_id, || {
            let now = self.clock.now();
            let offer = self.load_offer(offer_id)?;
            let property = self.load_property(&offer.property_id)?;
            self.expire_if_overdue(context, &offer, &property, now)?;

            let event = request.decision.event();
            let from = offer.status;
            let next = legal_next(&offer, event)?;
            let authorization = self.guard.check(
                request.decision.authorization_level(),
                &request.consents,
                &request.esign,
                &context.ip_address,
                now,
            )?;
            if let DecisionCommand::Counter { terms } = &request.decision {
                validate_counter_terms(terms)?;
            }
            self.check_revision(offer_id, offer.revision)?;

            let decision = SellerDecision {
                decision_id: self.ids.decision.next_id(),
                offer_id: offer.offer_id.clone(),
                property_id: offer.property_id.clone(),
                version_id: offer.current_version_id.to_string(),
                decided_by_user_id: context.actor.user_id.clone(),
                decision: request.decision.clone().into_payload(),
                authorization: Some(authorization),
                decided_at: now,
            };
            self.store.upsert(&decision)?;

            let mut updated = offer.clone();
            updated.status = next;
            let committed = self.commit_offer(offer.revision, updated, now)?;

            self.audit.record(
                context,
                event.action(),
                EntityType::Offer,
                committed.offer_id.as_str(),
                transition_metadata(
                    Some(from),
                    next,
                    &committed.current_version_id,
                    json!({
                        "decision_id": decision.decision_id,
                        "decision": decision.decision,
                    }),
                ),
            )?;
            info!(
                offer_id = %committed.offer_id,
                decision = decision.decision.label(),
                "seller decision recorded"
            );
            Ok((decision, committed))
        })?;

        Ok(DecisionReceipt {
            decision_recorded: true,
            decision,
            offer,
            cascade_declined: Vec::new(),
            integration: IntegrationStatus::NotApplicable,
        })
    }

    /// Expire every non-terminal offer whose property deadline has passed.
    pub async fn expire_overdue(&self, context: &RequestContext) -> Result<Vec<OfferId>, OfferError> {
        let now = self.clock.now();
        let properties = self.store.list::<Property>(|property| property.deadline_passed(now))?;

        let mut expired = Vec::new();
        for property in properties {
            let mut candidates: Vec<OfferId> = self
                .store
                .list::<Offer>(|offer| {
                    offer.property_id == property.property_id && !offer.status.is_terminal()
                })?
                .into_iter()
                .map(|offer| offer.offer_id)
                .collect();
            candidates.sort();

            for offer_id in candidates {
                let _guard = self.locks.offer(&offer_id).await?;
                let committed = self.retry_on_conflict(&offer_id, || {
                    let offer = self.load_offer(&offer_id)?;
                    if offer.status.is_terminal() {
                        return Ok(None);
                    }
                    self.expire_locked(context, offer, &property, now).map(Some)
                })?;
                if let Some(offer) = committed {
                    expired.push(offer.offer_id);
                }
            }
        }

        if !expired.is_empty() {
            info!(expired = expired.len(), "expired overdue offers");
        }
        Ok(expired)
    }

    /// Re-send every pending contract push whose backoff has elapsed.
    pub async fn retry_pending_pushes(&self) -> Result<RetrySummary, OfferError> {
        let now = self.clock.now();
        let mut due = self.store.list::<ContractPush>(|push| push.is_due(now))?;
        due.sort_by(|left, right| compare_sequence_ids(&left.push_id, &right.push_id));

        let context = RequestContext::system();
        let mut summary = RetrySummary::default();
        for candidate in due {
            let _guard = self.locks.push(&candidate.push_id).await?;
            let Some(push) = self.store.get::<ContractPush>(&candidate.push_id)? else {
                continue;
            };
            if !push.is_due(self.clock.now()) {
                continue;
            }

            summary.attempted += 1;
            let push = self.deliver(&context, push).await?;
            match push.status {
                PushStatus::Confirmed => summary.confirmed += 1,
                PushStatus::Pending => summary.rescheduled += 1,
                PushStatus::Failed => summary.failed += 1,
            }
        }
        Ok(summary)
    }

    async fn deliver(
        &self,
        context: &RequestContext,
        push: ContractPush,
    ) -> Result<ContractPush, OfferError> {
        let timeout = self.config.push_timeout;
        let outcome =
            match tokio::time::timeout(timeout, self.gateway.push_contract(&push.payload)).await {
                Ok(result) => result,
                Err(_) => Err(IntegrationError::Timeout(timeout)),
            };
        self.record_push_outcome(context, push, outcome)
    }

    fn record_push_outcome(
        &self,
        context: &RequestContext,
        mut push: ContractPush,
        outcome: Result<TransactionSpaceId, IntegrationError>,
    ) -> Result<ContractPush, OfferError> {
        let now = self.clock.now();
        push.attempts += 1;
        push.updated_at = now;

        match outcome {
            Ok(space_id) => {
                info!(
                    offer_id = %push.offer_id,
                    push_id = %push.push_id,
                    transaction_space_id = %space_id,
                    "contract push confirmed"
                );
                push.status = PushStatus::Confirmed;
                push.transaction_space_id = Some(space_id);
                push.next_attempt_at = None;
                push.last_error = None;
            }
            Err(err) => {
                push.last_error = Some(err.to_string());
                match self.config.retry.delay_after(push.attempts) {
                    Some(delay) => {
                        let next_attempt_at = now + chrono_delay(delay);
                        warn!(
                            offer_id = %push.offer_id,
                            push_id = %push.push_id,
                            attempts = push.attempts,
                            %next_attempt_at,
                            error = %err,
                            "contract push failed; retry scheduled"
                        );
                        push.status = PushStatus::Pending;
                        push.next_attempt_at = Some(next_attempt_at);
                    }
                    None => {
                        error!(
                            offer_id = %push.offer_id,
                            push_id = %push.push_id,
                            attempts = push.attempts,
                            error = %err,
                            "contract push abandoned after final attempt"
                        );
                        push.status = PushStatus::Failed;
                        push.next_attempt_at = None;
                    }
                }
            }
        }

        self.store.upsert(&push)?;
        self.audit.record(
            context,
            PUSH_ACTION,
            EntityType::ContractPush,
            &push.push_id,
            json!({
                "offer_id": push.offer_id,
                "decision_id": push.decision_id,
                "status": push.status.label(),
                "attempts": push.attempts,
                "payload_hash": push.payload_hash,
                "transaction_space_id": push.transaction_space_id,
                "error": push.last_error,
                "next_attempt_at": push.next_attempt_at,
            }),
        )?;
        Ok(push)
    }

    pub fn property(&self, property_id: &PropertyId) -> Result<Property, OfferError> {
        self.load_property(property_id)
    }

    pub fn offer(&self, offer_id: &OfferId) -> Result<Offer, OfferError> {
        self.load_offer(offer_id)
    }

    pub fn offer_status(&self, offer_id: &OfferId) -> Result<OfferStatusView, OfferError> {
        let offer = self.load_offer(offer_id)?;
        let current_version = self.load_version(&offer.current_version_id)?;
        let score = self.store.get::<OfferScore>(offer_id.as_str())?;
        let latest_decision = self.decisions(offer_id)?.pop();
        let contract_push = self.contract_pushes(Some(offer_id))?.pop();

        Ok(OfferStatusView {
            effective_score: score.as_ref().map(OfferScore::effective_score),
            offer,
            current_version,
            score,
            latest_decision,
            contract_push,
        })
    }

    pub fn offers_for_property(&self, property_id: &PropertyId) -> Result<Vec<Offer>, OfferError> {
        self.load_property(property_id)?;
        let mut offers = self
            .store
            .list::<Offer>(|offer| &offer.property_id == property_id)?;
        offers.sort_by(|left, right| {
            compare_sequence_ids(left.offer_id.as_str(), right.offer_id.as_str())
        });
        Ok(offers)
    }

    /// Version chain, oldest first.
    pub fn versions(&self, offer_id: &OfferId) -> Result<Vec<OfferVersion>, OfferError> {
        self.load_offer(offer_id)?;
        let mut versions = self
            .store
            .list::<OfferVersion>(|version| &version.offer_id == offer_id)?;
        versions.sort_by_key(|version| version.version_number);
        Ok(versions)
    }

    /// Decisions on an offer, oldest first; the last one is current.
    pub fn decisions(&self, offer_id: &OfferId) -> Result<Vec<SellerDecision>, OfferError> {
        let mut decisions = self
            .store
            .list::<SellerDecision>(|decision| &decision.offer_id == offer_id)?;
        decisions.sort_by(|left, right| {
            left.decided_at
                .cmp(&right.decided_at)
                .then_with(|| compare_sequence_ids(&left.decision_id, &right.decision_id))
        });
        Ok(decisions)
    }

    pub fn current_score(&self, offer_id: &OfferId) -> Result<Option<OfferScore>, OfferError> {
        Ok(self.store.get::<OfferScore>(offer_id.as_str())?)
    }

    pub fn query_audit(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, OfferError> {
        Ok(self.audit.query(query)?)
    }

    /// Status path reconstructed from the offer's audit entries.
    pub fn audit_path(&self, offer_id: &OfferId) -> Result<Vec<OfferStatus>, OfferError> {
        let entries = self
            .audit
            .query(&AuditQuery::for_entity(EntityType::Offer, offer_id.as_str()))?;
        replay_audit_path(&entries)
    }

    pub fn contract_pushes(
        &self,
        offer_id: Option<&OfferId>,
    ) -> Result<Vec<ContractPush>, OfferError> {
        let mut pushes = self
            .store
            .list::<ContractPush>(|push| offer_id.map_or(true, |id| &push.offer_id == id))?;
        pushes.sort_by(|left, right| compare_sequence_ids(&left.push_id, &right.push_id));
        Ok(pushes)
    }

    fn load_property(&self, property_id: &PropertyId) -> Result<Property, OfferError> {
        self.store
            .get::<Property>(property_id.as_str())?
            .ok_or_else(|| OfferError::not_found("property", property_id.as_str()))
    }

    fn load_offer(&self, offer_id: &OfferId) -> Result<Offer, OfferError> {
        self.store
            .get::<Offer>(offer_id.as_str())?
            .ok_or_else(|| OfferError::not_found("offer", offer_id.as_str()))
    }

    fn load_version(&self, version_id: &VersionId) -> Result<OfferVersion, OfferError> {
        self.store
            .get::<OfferVersion>(version_id.as_str())?
            .ok_or_else(|| OfferError::not_found("offer version", version_id.as_str()))
    }

    fn attach_documents(
        &self,
        context: &RequestContext,
        uploads: &[DocumentUpload],
        now: DateTime<Utc>,
    ) -> Vec<Document> {
        uploads
            .iter()
            .map(|upload| Document {
                document_id: self.ids.document.next_id(),
                kind: upload.kind,
                filename: upload.filename.trim().to_string(),
                storage_url: upload.storage_url.trim().to_string(),
                sha256_hash: upload.sha256_hash.trim().to_ascii_lowercase(),
                uploaded_by_user_id: context.actor.user_id.clone(),
                uploaded_at: now,
            })
            .collect()
    }

    fn check_revision(&self, offer_id: &OfferId, expected: u64) -> Result<(), OfferError> {
        let stored = self.load_offer(offer_id)?;
        if stored.revision != expected {
            return Err(OfferError::ConcurrentModification {
                offer_id: offer_id.to_string(),
            });
        }
        Ok(())
    }

    /// Write `offer` if the stored revision still matches the one it was read at.
    fn commit_offer(
        &self,
        expected_revision: u64,
        mut offer: Offer,
        now: DateTime<Utc>,
    ) -> Result<Offer, OfferError> {
        self.check_revision(&offer.offer_id, expected_revision)?;
        offer.revision = expected_revision + 1;
        offer.updated_at = now;
        self.store.upsert(&offer)?;
        Ok(offer)
    }

    /// Expire `offer` when its property's deadline has passed, then refuse the
    /// operation that noticed it.
    fn expire_if_overdue(
        &self,
        context: &RequestContext,
        offer: &Offer,
        property: &Property,
        now: DateTime<Utc>,
    ) -> Result<(), OfferError> {
        if offer.status.is_terminal() || !property.deadline_passed(now) {
            return Ok(());
        }
        let expired = self.expire_locked(context, offer.clone(), property, now)?;
        Err(OfferError::InvalidTransition(format!(
            "offer {} expired at the offer deadline",
            expired.offer_id
        )))
    }

    fn expire_locked(
        &self,
        context: &RequestContext,
        offer: Offer,
        property: &Property,
        now: DateTime<Utc>,
    ) -> Result<Offer, OfferError> {
        let from = offer.status;
        let next = legal_next(&offer, OfferEvent::Expire)?;
        let expected = offer.revision;
        let mut updated = offer;
        updated.status = next;
        let expired = self.commit_offer(expected, updated, now)?;

        self.audit.record(
            &context.as_system(),
            OfferEvent::Expire.action(),
            EntityType::Offer,
            expired.offer_id.as_str(),
            transition_metadata(
                Some(from),
                next,
                &expired.current_version_id,
                json!({
                    "reason": "offer_deadline",
                    "deadline": property.offer_deadline,
                }),
            ),
        )?;
        info!(offer_id = %expired.offer_id, "offer expired");
        Ok(expired)
    }

    /// Run `attempt`, and run it once more if it lost a revision race.
    fn retry_on_conflict<T>(
        &self,
        offer_id: &OfferId,
        mut attempt: impl FnMut() -> Result<T, OfferError>,
    ) -> Result<T, OfferError> {
        match attempt() {
            Err(OfferError::ConcurrentModification { .. }) => {
                warn!(offer_id = %offer_id, "concurrent modification detected; retrying once");
                attempt()
            }
            other => other,
        }
    }
}

fn legal_next(offer: &Offer, event: OfferEvent) -> Result<OfferStatus, OfferError> {
    offer.status.apply(event).ok_or_else(|| {
        OfferError::InvalidTransition(format!(
            "cannot {} offer {} while {}",
            event.label(),
            offer.offer_id,
            offer.status.label()
        ))
    })
}

fn transition_metadata(
    from: Option<OfferStatus>,
    to: OfferStatus,
    version_id: &VersionId,
    extra: Value,
) -> Value {
    let mut metadata = json!({
        "version_id": version_id,
        "from": from.map(OfferStatus::label),
        "to": to.label(),
    });
    if let (Value::Object(target), Value::Object(extra)) = (&mut metadata, extra) {
        target.extend(extra);
    }
    metadata
}

fn chrono_delay(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(365))
}
