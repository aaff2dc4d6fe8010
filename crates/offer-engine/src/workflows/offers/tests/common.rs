use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::to_bytes;
use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::offers::{
    ActorRole, Consents, Contingencies, ContractGateway, ContractPayload, DecisionCommand,
    DecisionRequest, DocumentKind, DocumentUpload, ESignInput, EngineConfig, Escalation,
    FinancingType, IntegrationError, ListingAgent, ManualClock, MemoryRecordStore, NewProperty,
    Offer, OfferEvent, OfferSubmission, OfferTerms, OfferTransactionService, Property,
    PropertyId, RecordStore, RequestContext, RetryPolicy, TransactionSpaceId, TransitionRequest,
};

pub(super) const PROPERTY_ID: &str = "prop_2590_onandaga";

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn digest(seed: char) -> String {
    std::iter::repeat(seed).take(64).collect()
}

pub(super) fn listing(deadline: Option<DateTime<Utc>>) -> NewProperty {
    NewProperty {
        property_id: Some(PROPERTY_ID.to_string()),
        address: "2590 Onandaga Dr, Upper Arlington, OH".to_string(),
        mls_number: "MLS-225590".to_string(),
        listing_price: 9_000_000,
        listing_agent: ListingAgent {
            name: "Morgan Ellis".to_string(),
            email: "morgan@ellisrealty.example".to_string(),
            brokerage: "Ellis Realty".to_string(),
        },
        offer_deadline: deadline,
    }
}

pub(super) fn terms(offer_price: u64) -> OfferTerms {
    OfferTerms {
        buyer_names: vec!["Jordan Reyes".to_string(), "Sam Reyes".to_string()],
        offer_price,
        earnest_money: offer_price / 50,
        earnest_money_holder: "Buckeye Title".to_string(),
        financing_type: FinancingType::Conventional,
        loan_amount: Some(offer_price * 3 / 4),
        down_payment: Some(offer_price / 4),
        closing_date: NaiveDate::from_ymd_opt(2026, 4, 10).expect("valid date"),
        possession_terms: "at closing".to_string(),
        contingencies: Contingencies {
            inspection: true,
            inspection_days: Some(7),
            appraisal: true,
            financing: true,
            other_text: None,
        },
        escalation: Escalation::default(),
        inclusions_exclusions: "washer and dryer convey".to_string(),
        agent_notes: "buyers are flexible on possession".to_string(),
    }
}

pub(super) fn submission(offer_price: u64) -> OfferSubmission {
    OfferSubmission {
        property_id: PropertyId::new(PROPERTY_ID),
        terms: terms(offer_price),
        documents: vec![
            DocumentUpload {
                kind: DocumentKind::Contract,
                filename: "purchase-contract.pdf".to_string(),
                storage_url: "s3://offers/purchase-contract.pdf".to_string(),
                sha256_hash: digest('c'),
            },
            DocumentUpload {
                kind: DocumentKind::PreApproval,
                filename: "pre-approval.pdf".to_string(),
                storage_url: "s3://offers/pre-approval.pdf".to_string(),
                sha256_hash: digest('a'),
            },
        ],
    }
}

pub(super) fn agent() -> RequestContext {
    RequestContext::new("agent-7", ActorRole::BuyerAgent, "203.0.113.7")
}

pub(super) fn reviewer() -> RequestContext {
    RequestContext::new("listing-agent-1", ActorRole::ListingAgent, "198.51.100.2")
}

pub(super) fn seller() -> RequestContext {
    RequestContext::new("seller-1", ActorRole::Seller, "192.0.2.44")
}

pub(super) fn authorized(decision: DecisionCommand) -> DecisionRequest {
    DecisionRequest {
        decision,
        consents: Consents::all_granted(),
        esign: ESignInput {
            typed_name: "Dana Whitfield".to_string(),
        },
    }
}

pub(super) fn review(event: OfferEvent) -> TransitionRequest {
    TransitionRequest { event, note: None }
}

/// Gateway fake: fails the first `failures` pushes, then hands out space ids.
#[derive(Debug, Default)]
pub(super) struct RecordingGateway {
    failures: AtomicU32,
    pushes: Mutex<Vec<ContractPayload>>,
}

impl RecordingGateway {
    pub(super) fn failing(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            pushes: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn pushes(&self) -> Vec<ContractPayload> {
        self.pushes.lock().expect("pushes lock").clone()
    }
}

#[async_trait]
impl ContractGateway for RecordingGateway {
    async fn push_contract(
        &self,
        payload: &ContractPayload,
    ) -> Result<TransactionSpaceId, IntegrationError> {
        let mut pushes = self.pushes.lock().expect("pushes lock");
        pushes.push(payload.clone());
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(IntegrationError::Transport("connection refused".to_string()));
        }
        Ok(TransactionSpaceId(format!("SS-{:04}", pushes.len())))
    }
}

pub(super) type TestService<S = MemoryRecordStore> = OfferTransactionService<S, RecordingGateway>;

pub(super) fn engine_config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            base_delay: std::time::Duration::from_secs(60),
            max_delay: std::time::Duration::from_secs(600),
            max_attempts: 3,
        },
        ..EngineConfig::default()
    }
}

pub(super) struct Harness<S: RecordStore + 'static = MemoryRecordStore> {
    pub service: Arc<TestService<S>>,
    pub store: Arc<S>,
    pub gateway: Arc<RecordingGateway>,
    pub clock: Arc<ManualClock>,
}

pub(super) fn harness_with<S: RecordStore + 'static>(
    store: Arc<S>,
    gateway: RecordingGateway,
) -> Harness<S> {
    let gateway = Arc::new(gateway);
    let clock = Arc::new(ManualClock::new(start()));
    let service = OfferTransactionService::with_clock(
        store.clone(),
        gateway.clone(),
        engine_config(),
        clock.clone(),
    )
    .expect("service builds");
    Harness {
        service: Arc::new(service),
        store,
        gateway,
        clock,
    }
}

pub(super) fn harness() -> Harness {
    harness_with(Arc::new(MemoryRecordStore::new()), RecordingGateway::default())
}

impl<S: RecordStore + 'static> Harness<S> {
    pub(super) async fn listed(&self) -> Property {
        self.service
            .register_property(&reviewer(), listing(None))
            .await
            .expect("property registers")
    }

    pub(super) async fn submitted(&self, offer_price: u64) -> Offer {
        self.service
            .submit_offer(&agent(), submission(offer_price))
            .await
            .expect("offer submits")
    }

    pub(super) async fn under_review(&self, offer_price: u64) -> Offer {
        let offer = self.submitted(offer_price).await;
        self.service
            .transition(&reviewer(), &offer.offer_id, review(OfferEvent::StartReview))
            .await
            .expect("review starts")
    }
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}
