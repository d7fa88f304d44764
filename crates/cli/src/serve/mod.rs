//! `holist serve` -- HTTP JSON API for the server ownership claim
//! subsystem.
//!
//! Exposes the claim lifecycle service as an async HTTP service using
//! `axum` + `tokio`. Supports concurrent request handling; claims on
//! different servers never serialize against each other.
//!
//! Security features:
//! - Claimant identity via the `X-User-Id` header (injected by the
//!   fronting account system; never authenticated here)
//! - Admin surface gated on `HOLIST_ADMIN_TOKEN` (X-Admin-Token header)
//! - CORS headers on all responses (permissive for local dev)
//! - Per-IP rate limiting (default: 60 req/min, configurable)
//!
//! Endpoints:
//! - GET    /health                              - Service status
//! - GET    /servers/{id}/claim/methods          - Method availability
//! - GET    /servers/{id}/claim/status           - Public ownership standing
//! - POST   /servers/{id}/claim/initiate         - Initiate a claim
//! - POST   /servers/{id}/claim/verify?method=   - Run verification
//! - DELETE /servers/{id}/claim/cancel           - Cancel a claim
//! - GET    /users/me/claims                     - Caller's claims
//! - GET    /users/me/claims/active              - Caller's pending claims
//! - GET    /users/me/claims/active/count        - Count of the above
//! - GET    /admin/claims                        - Paginated listing (admin)
//! - GET    /admin/claims/stats                  - Oversight counters (admin)
//! - GET    /admin/claims/expiring-soon          - Expiry lookahead (admin)
//! - GET    /admin/claims/server/{id}            - All claims on a server (admin)
//! - DELETE /admin/claims/{claimId}              - Invalidate a claim (admin)
//! - POST   /admin/claims/{claimId}/approve      - Approve an email claim (admin)
//! - POST   /admin/claims/expire-pending         - Run the expiry sweep (admin)
//! - DELETE /admin/claims/cleanup?daysToKeep=N   - Purge old terminal claims (admin)
//!
//! All responses use Content-Type: application/json.

mod admin;
mod handlers;
mod middleware;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};

use holist_core::ClaimPolicy;
use holist_engine::{default_probes, ClaimService};
use holist_storage::MemoryStore;

use self::middleware::{admin_auth_middleware, rate_limit_middleware};
use self::state::{AppState, RateLimiter};
use crate::fixtures;

/// Maximum request body size: 64 KB. Claim requests are tiny.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Default rate limit: 60 requests per minute per IP.
const DEFAULT_RATE_LIMIT: u64 = 60;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Interval between authoritative expiry sweeps: 5 minutes.
const EXPIRE_SWEEP_INTERVAL_SECS: u64 = 300;

/// Interval between retention cleanups: 24 hours.
const CLEANUP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Start the HTTP server on the given port, seeding listing and user
/// data from the given fixture files.
///
/// When TLS cert/key paths are provided, the server listens over HTTPS
/// using `axum-server` with rustls. Otherwise it uses plain HTTP.
pub async fn start_server(
    port: u16,
    fixture_paths: Vec<PathBuf>,
    _tls_cert: Option<PathBuf>,
    _tls_key: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());

    // Seed listing and user data
    for path in &fixture_paths {
        match fixtures::load(path) {
            Ok(fixture) => {
                let (servers, users) = fixtures::apply(&store, fixture).await?;
                eprintln!(
                    "Loaded {}: {} servers, {} users",
                    path.display(),
                    servers,
                    users
                );
            }
            Err(e) => {
                eprintln!("Warning: failed to load {}: {}", path.display(), e);
            }
        }
    }

    // Rate limit: from HOLIST_RATE_LIMIT env var, or default
    let rate_limit = std::env::var("HOLIST_RATE_LIMIT")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT);

    // Admin token: from HOLIST_ADMIN_TOKEN env var (None = admin surface off)
    let admin_token = std::env::var("HOLIST_ADMIN_TOKEN")
        .ok()
        .filter(|t| !t.is_empty());

    if admin_token.is_some() {
        eprintln!("Admin endpoints enabled");
    } else {
        eprintln!("Admin endpoints disabled (set HOLIST_ADMIN_TOKEN to enable)");
    }
    eprintln!("Rate limit: {} requests per minute per IP", rate_limit);

    let policy = ClaimPolicy::default();
    let probes = default_probes(&policy);
    let state = Arc::new(AppState {
        service: ClaimService::new(store, probes, policy),
        rate_limiter: RateLimiter::new(rate_limit),
        admin_token,
    });

    spawn_maintenance(state.clone());

    // CORS: permissive for local dev
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    let admin_routes = Router::new()
        .route("/admin/claims", get(admin::handle_list_claims))
        .route("/admin/claims/stats", get(admin::handle_stats))
        .route(
            "/admin/claims/expiring-soon",
            get(admin::handle_expiring_soon),
        )
        .route(
            "/admin/claims/server/{server_id}",
            get(admin::handle_server_claims),
        )
        .route("/admin/claims/{claim_id}", delete(admin::handle_invalidate))
        .route(
            "/admin/claims/{claim_id}/approve",
            post(admin::handle_approve),
        )
        .route(
            "/admin/claims/expire-pending",
            post(admin::handle_expire_pending),
        )
        .route("/admin/claims/cleanup", delete(admin::handle_cleanup))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    let app = Router::new()
        .route("/health", get(handlers::handle_health))
        .route(
            "/servers/{server_id}/claim/methods",
            get(handlers::handle_claim_methods),
        )
        .route(
            "/servers/{server_id}/claim/status",
            get(handlers::handle_claim_status),
        )
        .route(
            "/servers/{server_id}/claim/initiate",
            post(handlers::handle_initiate),
        )
        .route(
            "/servers/{server_id}/claim/verify",
            post(handlers::handle_verify),
        )
        .route(
            "/servers/{server_id}/claim/cancel",
            delete(handlers::handle_cancel),
        )
        .route("/users/me/claims", get(handlers::handle_my_claims))
        .route(
            "/users/me/claims/active",
            get(handlers::handle_my_active_claims),
        )
        .route(
            "/users/me/claims/active/count",
            get(handlers::handle_my_active_claim_count),
        )
        .merge(admin_routes)
        .fallback(handlers::handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);

    // TLS support via axum-server + rustls (requires `tls` feature)
    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&_tls_cert, &_tls_key) {
        let config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        eprintln!("Claim service listening on https://0.0.0.0:{}", port);
        axum_server::bind_rustls(socket_addr, config)
            .serve(app.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .await?;
        return Ok(());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    eprintln!("Claim service listening on http://0.0.0.0:{}", port);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    eprintln!("\nServer shut down.");
    Ok(())
}

/// Background maintenance: the authoritative expiry sweep every five
/// minutes and the retention cleanup daily. Both are idempotent, so a
/// missed or doubled tick is harmless.
fn spawn_maintenance(state: Arc<AppState>) {
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(EXPIRE_SWEEP_INTERVAL_SECS));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sweeper.service.expire_sweep().await {
                Ok(0) => {}
                Ok(n) => eprintln!("Expiry sweep: {} claims transitioned to EXPIRED", n),
                Err(e) => eprintln!("Expiry sweep failed: {}", e),
            }
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match state.service.cleanup_old_claims(None).await {
                Ok(0) => {}
                Ok(n) => eprintln!("Retention cleanup: {} terminal claims deleted", n),
                Err(e) => eprintln!("Retention cleanup failed: {}", e),
            }
        }
    });
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    eprintln!("\nReceived shutdown signal...");
}
