use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{debug, warn};

use super::audit::AuditQuery;
use super::decision::DecisionRequest;
use super::domain::{
    ActorRole, NewProperty, OfferId, OfferRevision, OfferSubmission, PropertyId, RequestContext,
};
use super::errors::OfferError;
use super::integration::ContractGateway;
use super::scoring::ScoreRequest;
use super::service::{OfferTransactionService, TransitionRequest};
use super::store::RecordStore;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const DEFAULT_ADDRESS: &str = "127.0.0.1";

type SharedService<S, G> = Arc<OfferTransactionService<S, G>>;

/// Router builder exposing the offer transaction endpoints.
pub fn offer_router<S, G>(service: SharedService<S, G>) -> Router
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    Router::new()
        .route("/api/v1/properties", post(register_property_handler::<S, G>))
        .route(
            "/api/v1/properties/:property_id",
            get(property_handler::<S, G>),
        )
        .route(
            "/api/v1/properties/:property_id/offers",
            get(property_offers_handler::<S, G>),
        )
        .route(
            "/api/v1/properties/:property_id/ranking",
            get(ranking_handler::<S, G>),
        )
        .route("/api/v1/offers", post(submit_handler::<S, G>))
        .route("/api/v1/offers/:offer_id", get(status_handler::<S, G>))
        .route(
            "/api/v1/offers/:offer_id/versions",
            get(versions_handler::<S, G>),
        )
        .route(
            "/api/v1/offers/:offer_id/transitions",
            post(transition_handler::<S, G>),
        )
        .route(
            "/api/v1/offers/:offer_id/revisions",
            post(revision_handler::<S, G>),
        )
        .route("/api/v1/offers/:offer_id/score", post(score_handler::<S, G>))
        .route(
            "/api/v1/offers/:offer_id/decision",
            post(decision_handler::<S, G>),
        )
        .route("/api/v1/audit", get(audit_handler::<S, G>))
        .with_state(service)
}

/// Caller identity from the upstream session layer.
pub(crate) fn request_context(headers: &HeaderMap) -> Result<RequestContext, Response> {
    let user_id = headers
        .get(ACTOR_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            let payload = json!({
                "error": format!("{ACTOR_ID_HEADER} header is required"),
                "kind": "unauthenticated",
            });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })?;

    let role = match headers
        .get(ACTOR_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some(raw) => ActorRole::parse(raw).ok_or_else(|| {
            let payload = json!({
                "error": format!("unknown actor role {raw}"),
                "kind": "validation",
            });
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        })?,
        None => ActorRole::BuyerAgent,
    };

    let ip_address = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_ADDRESS);

    Ok(RequestContext::new(user_id, role, ip_address))
}

pub(crate) fn error_response(error: OfferError) -> Response {
    if error.is_caller_error() {
        debug!(kind = error.kind(), error = %error, "request rejected");
    } else {
        warn!(kind = error.kind(), error = %error, "request failed");
    }
    let mut payload = json!({
        "error": error.to_string(),
        "kind": error.kind(),
    });
    if let OfferError::IncompleteAuthorization { missing } = &error {
        payload["missing"] = json!(missing);
    }
    (error.status_code(), Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, OfferError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn register_property_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    headers: HeaderMap,
    Json(property): Json<NewProperty>,
) -> Response
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    let context = match request_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.register_property(&context, property).await,
    )
}

pub(crate) async fn property_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path(property_id): Path<String>,
) -> Response
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    respond(StatusCode::OK, service.property(&PropertyId(property_id)))
}

pub(crate) async fn property_offers_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path(property_id): Path<String>,
) -> Response
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    respond(
        StatusCode::OK,
        service.offers_for_property(&PropertyId(property_id)),
    )
}

pub(crate) async fn ranking_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path(property_id): Path<String>,
) -> Response
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    respond(StatusCode::OK, service.rank_offers(&PropertyId(property_id)))
}

pub(crate) async fn submit_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    headers: HeaderMap,
    Json(submission): Json<OfferSubmission>,
) -> Response
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    let context = match request_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.submit_offer(&context, submission).await,
    )
}

pub(crate) async fn status_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path(offer_id): Path<String>,
) -> Response
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    respond(StatusCode::OK, service.offer_status(&OfferId(offer_id)))
}

pub(crate) async fn versions_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path(offer_id): Path<String>,
) -> Response
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    respond(StatusCode::OK, service.versions(&OfferId(offer_id)))
}

pub(crate) async fn transition_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path(offer_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<TransitionRequest>,
) -> Response
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    let context = match request_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service
            .transition(&context, &OfferId(offer_id), request)
            .await,
    )
}

pub(crate) async fn revision_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path(offer_id): Path<String>,
    headers: HeaderMap,
    Json(revision): Json<OfferRevision>,
) -> Response
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    let context = match request_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service
            .resubmit_offer(&context, &OfferId(offer_id), revision)
            .await,
    )
}

pub(crate) async fn score_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path(offer_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ScoreRequest>,
) -> Response
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    let context = match request_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service
            .score_offer(&context, &OfferId(offer_id), request)
            .await,
    )
}

pub(crate) async fn decision_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path(offer_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<DecisionRequest>,
) -> Response
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    let context = match request_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.decide(&context, &OfferId(offer_id), request).await,
    )
}

pub(crate) async fn audit_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Query(query): Query<AuditQuery>,
) -> Response
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    respond(StatusCode::OK, service.query_audit(&query))
}
