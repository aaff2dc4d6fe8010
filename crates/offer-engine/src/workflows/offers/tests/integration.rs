use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use secrecy::SecretString;
use serde_json::{json, Value};

use super::common::*;
use crate::workflows::offers::{
    AuditQuery, Clock, ContractGateway, ContractPayload, DecisionCommand, EngineConfig, EntityType,
    HttpContractGateway, IntegrationError, IntegrationStatus, ManualClock, MemoryRecordStore,
    OfferStatus, OfferTransactionService, PushStatus, TransactionSpaceId, UnconfiguredGateway,
};

fn push_entries<S: crate::workflows::offers::RecordStore + 'static>(
    harness: &Harness<S>,
) -> Vec<crate::workflows::offers::AuditEntry> {
    harness
        .service
        .query_audit(&AuditQuery {
            entity_type: Some(EntityType::ContractPush),
            ..AuditQuery::default()
        })
        .expect("audit")
}

#[tokio::test]
async fn failed_push_stays_pending_until_the_retry_succeeds() {
    let harness = harness_with(
        Arc::new(MemoryRecordStore::new()),
        RecordingGateway::failing(1),
    );
    harness.listed().await;
    let offer = harness.under_review(9_000_000).await;

    let receipt = harness
        .service
        .decide(&seller(), &offer.offer_id, authorized(DecisionCommand::Accept))
        .await
        .expect("decision recorded despite push failure");
    assert!(receipt.decision_recorded);
    assert_eq!(receipt.offer.status, OfferStatus::Accepted);
    match &receipt.integration {
        IntegrationStatus::Pending {
            push_id,
            reason,
            next_attempt_at,
        } => {
            assert_eq!(push_id, "PUSH-000001");
            assert!(reason.contains("connection refused"));
            assert_eq!(*next_attempt_at, Some(start() + chrono::Duration::seconds(60)));
        }
        other => panic!("expected pending push, got {other:?}"),
    }

    let early = harness.service.retry_pending_pushes().await.expect("retry");
    assert_eq!(early.attempted, 0);

    harness.clock.advance(chrono::Duration::seconds(61));
    let summary = harness.service.retry_pending_pushes().await.expect("retry");
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.confirmed, 1);

    let pushes = harness
        .service
        .contract_pushes(Some(&offer.offer_id))
        .expect("pushes");
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].status, PushStatus::Confirmed);
    assert_eq!(pushes[0].attempts, 2);
    assert_eq!(
        pushes[0].transaction_space_id,
        Some(TransactionSpaceId("SS-0002".to_string()))
    );
    assert!(pushes[0].last_error.is_none());

    let sent = harness.gateway.pushes();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], sent[1]);

    let statuses: Vec<Value> = push_entries(&harness)
        .into_iter()
        .map(|entry| entry.metadata["status"].clone())
        .collect();
    assert_eq!(statuses, vec![json!("pending"), json!("confirmed")]);
}

#[tokio::test]
async fn push_is_marked_failed_once_attempts_run_out() {
    let harness = harness_with(
        Arc::new(MemoryRecordStore::new()),
        RecordingGateway::failing(u32::MAX),
    );
    harness.listed().await;
    let offer = harness.submitted(9_000_000).await;
    harness
        .service
        .decide(&seller(), &offer.offer_id, authorized(DecisionCommand::Accept))
        .await
        .expect("accepted");

    harness.clock.advance(chrono::Duration::seconds(61));
    let second = harness.service.retry_pending_pushes().await.expect("retry");
    assert_eq!(second.rescheduled, 1);

    let pending = harness.service.contract_pushes(None).expect("pushes");
    assert_eq!(
        pending[0].next_attempt_at,
        Some(harness.clock.now() + chrono::Duration::seconds(120))
    );

    harness.clock.advance(chrono::Duration::seconds(121));
    let third = harness.service.retry_pending_pushes().await.expect("retry");
    assert_eq!(third.failed, 1);

    harness.clock.advance(chrono::Duration::hours(1));
    let idle = harness.service.retry_pending_pushes().await.expect("retry");
    assert_eq!(idle.attempted, 0);

    let push = &harness.service.contract_pushes(None).expect("pushes")[0];
    assert_eq!(push.status, PushStatus::Failed);
    assert_eq!(push.attempts, 3);
    assert_eq!(push.next_attempt_at, None);
    assert!(matches!(
        push.integration_status(),
        IntegrationStatus::Failed { .. }
    ));
    assert_eq!(
        harness.service.offer(&offer.offer_id).expect("offer").status,
        OfferStatus::Accepted
    );
    assert_eq!(push_entries(&harness).len(), 3);
}

struct StalledGateway;

#[async_trait]
impl ContractGateway for StalledGateway {
    async fn push_contract(
        &self,
        _payload: &ContractPayload,
    ) -> Result<TransactionSpaceId, IntegrationError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(TransactionSpaceId("SS-late".to_string()))
    }
}

#[tokio::test]
async fn slow_contract_system_times_out_into_a_pending_push() {
    let clock = Arc::new(ManualClock::new(start()));
    let service = OfferTransactionService::with_clock(
        Arc::new(MemoryRecordStore::new()),
        Arc::new(StalledGateway),
        EngineConfig {
            push_timeout: Duration::from_millis(20),
            ..engine_config()
        },
        clock,
    )
    .expect("service builds");
    service
        .register_property(&reviewer(), listing(None))
        .await
        .expect("property");
    let offer = service
        .submit_offer(&agent(), submission(9_000_000))
        .await
        .expect("offer");

    let receipt = service
        .decide(&seller(), &offer.offer_id, authorized(DecisionCommand::Accept))
        .await
        .expect("decision recorded");
    match receipt.integration {
        IntegrationStatus::Pending { reason, .. } => assert!(reason.contains("timed out")),
        other => panic!("expected pending push, got {other:?}"),
    }
    assert_eq!(receipt.offer.status, OfferStatus::Accepted);
}

#[tokio::test]
async fn unconfigured_gateway_keeps_pushes_pending() {
    let service = OfferTransactionService::with_clock(
        Arc::new(MemoryRecordStore::new()),
        Arc::new(UnconfiguredGateway),
        engine_config(),
        Arc::new(ManualClock::new(start())),
    )
    .expect("service builds");
    service
        .register_property(&reviewer(), listing(None))
        .await
        .expect("property");
    let offer = service
        .submit_offer(&agent(), submission(9_000_000))
        .await
        .expect("offer");

    let receipt = service
        .decide(&seller(), &offer.offer_id, authorized(DecisionCommand::Accept))
        .await
        .expect("decision recorded");
    assert!(matches!(
        receipt.integration,
        IntegrationStatus::Pending { ref reason, .. } if reason.contains("not configured")
    ));
}

#[tokio::test]
async fn payload_carries_sorted_documents_and_a_stable_hash() {
    let harness = harness();
    harness.listed().await;
    let offer = harness.submitted(9_000_000).await;
    harness
        .service
        .decide(&seller(), &offer.offer_id, authorized(DecisionCommand::Accept))
        .await
        .expect("accepted");

    let push = &harness.service.contract_pushes(None).expect("pushes")[0];
    let payload = &push.payload;
    assert_eq!(payload.documents.len(), 2);
    assert_eq!(payload.documents[0].sha256_hash, digest('a'));
    assert_eq!(payload.documents[1].sha256_hash, digest('c'));
    assert_eq!(payload.documents_hash.len(), 64);
    assert_eq!(push.payload_hash, payload.payload_hash());
    assert_eq!(payload.payload_hash(), payload.clone().payload_hash());
    assert_eq!(payload.buyer_names, vec!["Jordan Reyes", "Sam Reyes"]);
    assert_eq!(payload.mls_number, "MLS-225590");
}

async fn contract_system(status: StatusCode) -> String {
    let app = Router::new().route(
        "/contracts",
        post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
            let authorized = headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                == Some("Bearer push-token");
            let hashed = headers.contains_key("x-payload-hash");
            if !authorized || !hashed {
                return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "denied" })));
            }
            if status != StatusCode::OK {
                return (status, Json(json!({ "error": "maintenance" })));
            }
            let space = format!("SS-{}", body["offer_id"].as_str().unwrap_or("unknown"));
            (StatusCode::OK, Json(json!({ "smart_space_id": space })))
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let address = listener.local_addr().expect("address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{address}/contracts")
}

async fn sample_payload() -> ContractPayload {
    let harness = harness();
    harness.listed().await;
    let offer = harness.submitted(9_000_000).await;
    harness
        .service
        .decide(&seller(), &offer.offer_id, authorized(DecisionCommand::Accept))
        .await
        .expect("accepted");
    harness.gateway.pushes().remove(0)
}

#[tokio::test]
async fn http_gateway_posts_the_payload_with_bearer_token() {
    let endpoint = contract_system(StatusCode::OK).await;
    let gateway = HttpContractGateway::new(
        endpoint,
        Some(SecretString::from("push-token".to_string())),
        Duration::from_secs(5),
    )
    .expect("client builds");

    let space = gateway
        .push_contract(&sample_payload().await)
        .await
        .expect("pushed");
    assert_eq!(space, TransactionSpaceId("SS-OFF-000001".to_string()));
    assert!(!format!("{gateway:?}").contains("push-token"));
}

#[tokio::test]
async fn http_gateway_reports_rejections() {
    let endpoint = contract_system(StatusCode::SERVICE_UNAVAILABLE).await;
    let gateway = HttpContractGateway::new(
        endpoint.clone(),
        Some(SecretString::from("push-token".to_string())),
        Duration::from_secs(5),
    )
    .expect("client builds");
    let err = gateway
        .push_contract(&sample_payload().await)
        .await
        .expect_err("maintenance");
    assert!(matches!(err, IntegrationError::Rejected { status: 503, .. }));

    let anonymous =
        HttpContractGateway::new(endpoint, None, Duration::from_secs(5)).expect("client builds");
    let err = anonymous
        .push_contract(&sample_payload().await)
        .await
        .expect_err("no token");
    assert!(matches!(err, IntegrationError::Rejected { status: 401, .. }));
}
