//! Claimant-facing route handlers: method discovery, claim lifecycle,
//! and health.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use holist_core::VerificationMethod;
use holist_engine::ClaimError;

use super::middleware::{MaybeUserId, UserId};
use super::state::AppState;
use super::json_error;

/// Map a service error onto the HTTP taxonomy. Storage details stay in
/// the server log; callers get a generic 500.
pub(crate) fn claim_error_response(err: ClaimError) -> Response {
    match err {
        ClaimError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, &msg).into_response(),
        ClaimError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, &msg).into_response(),
        ClaimError::Conflict(msg) => json_error(StatusCode::CONFLICT, &msg).into_response(),
        ClaimError::Unauthorized(msg) => json_error(StatusCode::FORBIDDEN, &msg).into_response(),
        ClaimError::RateLimited { retry_after_secs } => {
            let body = serde_json::json!({
                "error": "verification rate limit exceeded",
                "retry_after": retry_after_secs,
            });
            (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
        }
        ClaimError::Storage(e) => {
            eprintln!("storage error: {}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal storage error")
                .into_response()
        }
    }
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// GET /servers/{server_id}/claim/methods
pub(crate) async fn handle_claim_methods(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
    MaybeUserId(user_id): MaybeUserId,
) -> Response {
    match state
        .service
        .available_methods(&server_id, user_id.as_deref())
        .await
    {
        Ok(methods) => (
            StatusCode::OK,
            Json(serde_json::json!({ "methods": methods })),
        )
            .into_response(),
        Err(e) => claim_error_response(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InitiateRequest {
    verification_method: String,
}

/// POST /servers/{server_id}/claim/initiate
pub(crate) async fn handle_initiate(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
    UserId(user_id): UserId,
    Json(request): Json<InitiateRequest>,
) -> Response {
    let method: VerificationMethod = match request.verification_method.parse() {
        Ok(method) => method,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e).into_response(),
    };
    match state.service.initiate(&server_id, &user_id, method).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => claim_error_response(e),
    }
}

/// GET /servers/{server_id}/claim/status
///
/// Public: anyone may read a server's ownership standing. An optional
/// `X-User-Id` header enriches the response with the caller's own
/// pending-claim state.
pub(crate) async fn handle_claim_status(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
    MaybeUserId(user_id): MaybeUserId,
) -> Response {
    match state
        .service
        .server_claim_status(&server_id, user_id.as_deref())
        .await
    {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => claim_error_response(e),
    }
}

#[derive(Deserialize)]
pub(crate) struct VerifyQuery {
    method: Option<String>,
}

/// POST /servers/{server_id}/claim/verify?method=
pub(crate) async fn handle_verify(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
    Query(query): Query<VerifyQuery>,
    UserId(user_id): UserId,
) -> Response {
    let method: Option<VerificationMethod> = match query.method.as_deref() {
        Some(raw) => match raw.parse() {
            Ok(method) => Some(method),
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e).into_response(),
        },
        None => None,
    };
    match state
        .service
        .attempt_verification_for(&server_id, &user_id, method)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => claim_error_response(e),
    }
}

/// DELETE /servers/{server_id}/claim/cancel
pub(crate) async fn handle_cancel(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
    UserId(user_id): UserId,
) -> Response {
    match state.service.cancel_for(&server_id, &user_id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => claim_error_response(e),
    }
}

/// GET /users/me/claims
pub(crate) async fn handle_my_claims(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Response {
    match state.service.user_claims(&user_id).await {
        Ok(claims) => (
            StatusCode::OK,
            Json(serde_json::json!({ "claims": claims })),
        )
            .into_response(),
        Err(e) => claim_error_response(e),
    }
}

/// GET /users/me/claims/active
pub(crate) async fn handle_my_active_claims(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Response {
    match state.service.active_claims(&user_id).await {
        Ok(claims) => (
            StatusCode::OK,
            Json(serde_json::json!({ "claims": claims })),
        )
            .into_response(),
        Err(e) => claim_error_response(e),
    }
}

/// GET /users/me/claims/active/count
pub(crate) async fn handle_my_active_claim_count(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Response {
    match state.service.active_claim_count(&user_id).await {
        Ok(count) => (StatusCode::OK, Json(serde_json::json!({ "count": count }))).into_response(),
        Err(e) => claim_error_response(e),
    }
}
