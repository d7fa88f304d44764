//! HTTP middleware and extractors: rate limiting, admin authentication,
//! and claimant identity headers.

use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::state::AppState;
use super::json_error;

/// Rate limiting middleware. Checks per-IP request rate before routing.
pub(crate) async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();
    match state.rate_limiter.check(ip).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            let body = serde_json::json!({
                "error": "rate limit exceeded",
                "retry_after": retry_after,
            });
            (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
        }
    }
}

/// Admin authentication middleware, applied to the `/admin` sub-router
/// and other oversight routes.
///
/// Requires `X-Admin-Token: <token>` matching the `HOLIST_ADMIN_TOKEN`
/// env var. With no token configured the whole admin surface is off.
pub(crate) async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let expected = match &state.admin_token {
        Some(token) => token,
        None => {
            return json_error(StatusCode::FORBIDDEN, "admin access is not configured")
                .into_response()
        }
    };

    let provided = request
        .headers()
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(token) if token == expected => next.run(request).await,
        Some(_) => json_error(StatusCode::FORBIDDEN, "invalid admin token").into_response(),
        None => json_error(StatusCode::UNAUTHORIZED, "admin authentication required")
            .into_response(),
    }
}

/// Claimant identity, injected by the fronting account system as an
/// `X-User-Id` header. This service trusts the header; it never
/// authenticates users itself.
pub(crate) struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match header_value(parts, "x-user-id") {
            Some(id) => Ok(UserId(id)),
            None => Err(
                json_error(StatusCode::UNAUTHORIZED, "missing X-User-Id header").into_response(),
            ),
        }
    }
}

/// Like `UserId` but tolerates anonymous callers (method discovery).
pub(crate) struct MaybeUserId(pub Option<String>);

impl<S> FromRequestParts<S> for MaybeUserId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUserId(header_value(parts, "x-user-id")))
    }
}

/// Acting administrator's identity for the audit trail.
pub(crate) struct AdminId(pub String);

impl<S> FromRequestParts<S> for AdminId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match header_value(parts, "x-admin-id") {
            Some(id) => Ok(AdminId(id)),
            None => Err(
                json_error(StatusCode::BAD_REQUEST, "missing X-Admin-Id header").into_response(),
            ),
        }
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
