//! Administrative oversight handlers. All routes here sit behind the
//! admin token middleware; mutating ones also record an audit row keyed
//! by the `X-Admin-Id` header.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use holist_core::ClaimStatus;

use super::handlers::claim_error_response;
use super::middleware::AdminId;
use super::state::AppState;
use super::json_error;

/// Default and maximum page sizes for the claim listing.
const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    status: Option<String>,
    page: Option<usize>,
    size: Option<usize>,
}

/// GET /admin/claims?status=&page=&size=
pub(crate) async fn handle_list_claims(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let status = match &query.status {
        Some(raw) => match raw.parse::<ClaimStatus>() {
            Ok(status) => Some(status),
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e).into_response(),
        },
        None => None,
    };
    let page = query.page.unwrap_or(0);
    let size = query.size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    match state.service.admin_list_claims(status, page, size).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => claim_error_response(e),
    }
}

/// GET /admin/claims/stats
pub(crate) async fn handle_stats(State(state): State<Arc<AppState>>) -> Response {
    match state.service.admin_stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => claim_error_response(e),
    }
}

/// GET /admin/claims/expiring-soon
pub(crate) async fn handle_expiring_soon(State(state): State<Arc<AppState>>) -> Response {
    match state.service.admin_expiring_soon().await {
        Ok(claims) => (
            StatusCode::OK,
            Json(serde_json::json!({ "claims": claims })),
        )
            .into_response(),
        Err(e) => claim_error_response(e),
    }
}

/// DELETE /admin/claims/{claim_id}
pub(crate) async fn handle_invalidate(
    State(state): State<Arc<AppState>>,
    Path(claim_id): Path<String>,
    AdminId(admin_id): AdminId,
) -> Response {
    match state.service.admin_invalidate(&claim_id, &admin_id).await {
        Ok(view) => {
            eprintln!("admin {} invalidated claim {}", admin_id, claim_id);
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(e) => claim_error_response(e),
    }
}

/// POST /admin/claims/{claim_id}/approve
pub(crate) async fn handle_approve(
    State(state): State<Arc<AppState>>,
    Path(claim_id): Path<String>,
    AdminId(admin_id): AdminId,
) -> Response {
    match state.service.admin_approve(&claim_id, &admin_id).await {
        Ok(view) => {
            eprintln!("admin {} approved claim {}", admin_id, claim_id);
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(e) => claim_error_response(e),
    }
}

/// GET /admin/claims/server/{server_id}
pub(crate) async fn handle_server_claims(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
) -> Response {
    match state.service.server_claims(&server_id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => claim_error_response(e),
    }
}

/// POST /admin/claims/expire-pending
///
/// On-demand run of the authoritative expiry sweep the background task
/// performs on its own schedule.
pub(crate) async fn handle_expire_pending(State(state): State<Arc<AppState>>) -> Response {
    match state.service.expire_sweep().await {
        Ok(expired) => {
            if expired > 0 {
                eprintln!("Expiry sweep (admin): {} claims transitioned to EXPIRED", expired);
            }
            (StatusCode::OK, Json(serde_json::json!({ "expired": expired }))).into_response()
        }
        Err(e) => claim_error_response(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CleanupQuery {
    days_to_keep: Option<i64>,
}

/// DELETE /admin/claims/cleanup?daysToKeep=N
pub(crate) async fn handle_cleanup(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CleanupQuery>,
) -> Response {
    match state.service.cleanup_old_claims(query.days_to_keep).await {
        Ok(deleted) => {
            if deleted > 0 {
                eprintln!("Retention cleanup (admin): {} terminal claims deleted", deleted);
            }
            (StatusCode::OK, Json(serde_json::json!({ "deleted": deleted }))).into_response()
        }
        Err(e) => claim_error_response(e),
    }
}
