use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::workflows::offers::router::{
    offer_router, status_handler, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER, FORWARDED_FOR_HEADER,
};
use crate::workflows::offers::{
    AuditQuery, Consents, DecisionCommand, DecisionRequest, ESignInput, EntityType, OfferEvent,
    ScoreRequest, TransitionRequest,
};

fn request(
    method: &str,
    uri: &str,
    actor: Option<(&str, &str)>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(FORWARDED_FOR_HEADER, "203.0.113.9, 10.0.0.1");
    if let Some((user_id, role)) = actor {
        builder = builder
            .header(ACTOR_ID_HEADER, user_id)
            .header(ACTOR_ROLE_HEADER, role);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("encode body")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

fn router(harness: &Harness) -> Router {
    offer_router(harness.service.clone())
}

const AGENT: Option<(&str, &str)> = Some(("agent-7", "buyer_agent"));
const SELLER: Option<(&str, &str)> = Some(("seller-1", "seller"));
const REVIEWER: Option<(&str, &str)> = Some(("listing-agent-1", "listing_agent"));

#[tokio::test]
async fn mutations_require_an_actor() {
    let harness = harness();
    harness.listed().await;

    let response = router(&harness)
        .oneshot(request(
            "POST",
            "/api/v1/offers",
            None,
            Some(serde_json::to_value(submission(9_000_000)).expect("json")),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["kind"], json!("unauthenticated"));
}

#[tokio::test]
async fn unknown_roles_are_rejected() {
    let harness = harness();
    let response = router(&harness)
        .oneshot(request(
            "POST",
            "/api/v1/properties",
            Some(("landlord-1", "landlord")),
            Some(serde_json::to_value(listing(None)).expect("json")),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn offer_flows_through_the_http_surface() {
    let harness = harness();

    let response = router(&harness)
        .oneshot(request(
            "POST",
            "/api/v1/properties",
            REVIEWER,
            Some(serde_json::to_value(listing(None)).expect("json")),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router(&harness)
        .oneshot(request(
            "POST",
            "/api/v1/offers",
            AGENT,
            Some(serde_json::to_value(submission(9_000_000)).expect("json")),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let offer = json_body(response).await;
    assert_eq!(offer["offer_id"], json!("OFF-000001"));
    assert_eq!(offer["status"], json!("submitted"));

    let response = router(&harness)
        .oneshot(request(
            "POST",
            "/api/v1/offers/OFF-000001/transitions",
            REVIEWER,
            Some(
                serde_json::to_value(TransitionRequest {
                    event: OfferEvent::StartReview,
                    note: Some("complete package".to_string()),
                })
                .expect("json"),
            ),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router(&harness)
        .oneshot(request(
            "POST",
            "/api/v1/offers/OFF-000001/score",
            REVIEWER,
            Some(serde_json::to_value(ScoreRequest::default()).expect("json")),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router(&harness)
        .oneshot(request(
            "GET",
            &format!("/api/v1/properties/{PROPERTY_ID}/ranking"),
            None,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let ranking = json_body(response).await;
    assert_eq!(ranking[0]["rank"], json!(1));
    assert!(ranking[0]["effective_score"].is_number());

    let response = router(&harness)
        .oneshot(request(
            "POST",
            "/api/v1/offers/OFF-000001/decision",
            SELLER,
            Some(serde_json::to_value(authorized(DecisionCommand::Accept)).expect("json")),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let receipt = json_body(response).await;
    assert_eq!(receipt["decision_recorded"], json!(true));
    assert_eq!(receipt["integration"]["status"], json!("confirmed"));
    assert_eq!(
        receipt["decision"]["authorization"]["esign"]["ip_address"],
        json!("203.0.113.9")
    );

    let response = router(&harness)
        .oneshot(request(
            "GET",
            "/api/v1/audit?entity_type=offer&entity_id=OFF-000001",
            None,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let entries = json_body(response).await;
    let actions: Vec<_> = entries
        .as_array()
        .expect("array")
        .iter()
        .map(|entry| entry["action"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        actions,
        vec!["offer.submitted", "offer.review_started", "offer.accepted"]
    );

    let response = router(&harness)
        .oneshot(request("GET", "/api/v1/offers/OFF-000001/versions", None, None))
        .await
        .expect("response");
    let versions = json_body(response).await;
    assert_eq!(versions.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn incomplete_authorization_reports_missing_consents() {
    let harness = harness();
    harness.listed().await;
    harness.under_review(9_000_000).await;

    let unconsented = DecisionRequest {
        decision: DecisionCommand::Accept,
        consents: Consents {
            confirm_accuracy: true,
            ..Consents::default()
        },
        esign: ESignInput {
            typed_name: "Dana Whitfield".to_string(),
        },
    };
    let response = router(&harness)
        .oneshot(request(
            "POST",
            "/api/v1/offers/OFF-000001/decision",
            SELLER,
            Some(serde_json::to_value(unconsented).expect("json")),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["kind"], json!("incomplete_authorization"));
    assert_eq!(
        body["missing"],
        json!(["authorize_smart_transaction", "authorize_sharing"])
    );

    let entries = harness
        .service
        .query_audit(&AuditQuery::for_entity(EntityType::Offer, "OFF-000001"))
        .expect("audit");
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn illegal_transition_maps_to_conflict() {
    let harness = harness();
    harness.listed().await;
    harness.submitted(9_000_000).await;

    let response = router(&harness)
        .oneshot(request(
            "POST",
            "/api/v1/offers/OFF-000001/transitions",
            REVIEWER,
            Some(json!({ "event": "request_revision" })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["kind"], json!("invalid_transition"));
}

#[tokio::test]
async fn status_handler_returns_not_found_for_unknown_offers() {
    let harness = harness();
    let response = status_handler::<_, RecordingGateway>(
        State(harness.service.clone()),
        Path("OFF-424242".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["kind"], json!("not_found"));
}

#[test]
fn forwarded_address_falls_back_to_loopback() {
    let mut headers = HeaderMap::new();
    headers.insert(ACTOR_ID_HEADER, HeaderValue::from_static("agent-7"));
    let context =
        crate::workflows::offers::router::request_context(&headers).expect("context resolves");
    assert_eq!(context.ip_address, "127.0.0.1");
    assert_eq!(
        context.actor.role,
        crate::workflows::offers::ActorRole::BuyerAgent
    );
}
