//! Integration tests for the `holist serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port,
//! makes HTTP requests, and verifies the responses.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from process ID so parallel `cargo test --workspace` runs
/// (which spawn separate test binaries) don't collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 21000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

const FIXTURE: &str = r#"{
    "servers": [
        {"id": "s1", "name": "Skyfall", "host": "play.example.com", "port": 5520,
         "websiteUrl": "https://example.com"}
    ],
    "users": [
        {"id": "u1", "username": "alice", "email": "alice@example.com", "emailVerified": true}
    ]
}"#;

struct TestServer {
    child: Child,
    port: u16,
    _fixture: tempfile::NamedTempFile,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Helper: start the holist serve process with the standard fixture.
fn start_server(admin_token: Option<&str>) -> TestServer {
    let port = next_port();
    let mut fixture = tempfile::NamedTempFile::new().expect("fixture file");
    fixture.write_all(FIXTURE.as_bytes()).expect("write fixture");

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_holist"));
    cmd.arg("serve")
        .arg("--port")
        .arg(port.to_string())
        .arg(fixture.path());
    if let Some(token) = admin_token {
        cmd.env("HOLIST_ADMIN_TOKEN", token);
    }
    // Redirect stdout/stderr to avoid blocking
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let child = cmd.spawn().expect("failed to start holist serve");
    // Wait for server to be ready by polling the port
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            return TestServer {
                child,
                port,
                _fixture: fixture,
            };
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    TestServer {
        child,
        port,
        _fixture: fixture,
    }
}

/// Helper: make an HTTP request and return (status, body).
fn http_request(
    port: u16,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (u16, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    let mut header_lines = String::new();
    for (name, value) in headers {
        header_lines.push_str(&format!("{}: {}\r\n", name, value));
    }
    let body = body.unwrap_or("");
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost:{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
        method, path, port, body.len(), header_lines, body
    );
    stream.write_all(request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    let status = response
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .unwrap_or(0);
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_default();
    (status, body)
}

fn get(port: u16, path: &str, headers: &[(&str, &str)]) -> (u16, String) {
    http_request(port, "GET", path, headers, None)
}

fn post(port: u16, path: &str, headers: &[(&str, &str)], body: &str) -> (u16, String) {
    http_request(port, "POST", path, headers, Some(body))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[test]
fn health_endpoint_reports_ok() {
    let server = start_server(None);
    let (status, body) = get(server.port, "/health", &[]);
    assert_eq!(status, 200, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[test]
fn unknown_route_returns_json_404() {
    let server = start_server(None);
    let (status, body) = get(server.port, "/nope", &[]);
    assert_eq!(status, 404);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(json["error"].is_string());
}

#[test]
fn claim_methods_reflect_the_listing() {
    let server = start_server(None);
    let (status, body) = get(
        server.port,
        "/servers/s1/claim/methods",
        &[("X-User-Id", "u1")],
    );
    assert_eq!(status, 200, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    let methods = json["methods"].as_array().unwrap();
    assert_eq!(methods.len(), 4);

    let motd = methods.iter().find(|m| m["method"] == "MOTD").unwrap();
    assert_eq!(motd["available"], true);
    // alice@example.com matches the listing's domain
    let email = methods.iter().find(|m| m["method"] == "EMAIL").unwrap();
    assert_eq!(email["available"], true);
}

#[test]
fn claim_methods_for_unknown_server_is_404() {
    let server = start_server(None);
    let (status, _) = get(server.port, "/servers/ghost/claim/methods", &[]);
    assert_eq!(status, 404);
}

#[test]
fn claim_lifecycle_over_http() {
    let server = start_server(None);

    // Initiate
    let (status, body) = post(
        server.port,
        "/servers/s1/claim/initiate",
        &[("X-User-Id", "u1")],
        r#"{"verificationMethod": "MOTD"}"#,
    );
    assert_eq!(status, 201, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    let token = json["verificationToken"].as_str().unwrap();
    assert!(token.len() >= 22);
    assert!(json["instructions"].as_str().unwrap().contains(token));

    // A second initiation conflicts
    let (status, _) = post(
        server.port,
        "/servers/s1/claim/initiate",
        &[("X-User-Id", "u1")],
        r#"{"verificationMethod": "MOTD"}"#,
    );
    assert_eq!(status, 409);

    // Status is public: an anonymous read sees the server unclaimed
    let (status, body) = get(server.port, "/servers/s1/claim/status", &[]);
    assert_eq!(status, 200, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["isClaimed"], false);
    assert_eq!(json["isVerified"], false);
    assert_eq!(json["hasPendingClaim"], false);

    // The claimant's identity surfaces their pending claim and its expiry
    let (status, body) = get(
        server.port,
        "/servers/s1/claim/status",
        &[("X-User-Id", "u1")],
    );
    assert_eq!(status, 200, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["hasPendingClaim"], true);
    assert!(json["claimTokenExpiry"].is_string());

    // Another user has no pending claim here
    let (status, body) = get(
        server.port,
        "/servers/s1/claim/status",
        &[("X-User-Id", "u2")],
    );
    assert_eq!(status, 200, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["hasPendingClaim"], false);

    // Verifying with the wrong method name is a caller mistake
    let (status, body) = post(
        server.port,
        "/servers/s1/claim/verify?method=DNS_TXT",
        &[("X-User-Id", "u1")],
        "",
    );
    assert_eq!(status, 400, "body: {}", body);

    // The active rollup sees the pending claim
    let (status, body) = get(
        server.port,
        "/users/me/claims/active/count",
        &[("X-User-Id", "u1")],
    );
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["count"], 1);

    // Cancel
    let (status, body) = http_request(
        server.port,
        "DELETE",
        "/servers/s1/claim/cancel",
        &[("X-User-Id", "u1")],
        None,
    );
    assert_eq!(status, 200, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "CANCELLED");

    // The cancellation shows through the public status
    let (status, body) = get(
        server.port,
        "/servers/s1/claim/status",
        &[("X-User-Id", "u1")],
    );
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["hasPendingClaim"], false);

    // The user's claim list shows the cancelled claim; active does not
    let (status, body) = get(server.port, "/users/me/claims", &[("X-User-Id", "u1")]);
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["claims"].as_array().unwrap().len(), 1);

    let (status, body) = get(
        server.port,
        "/users/me/claims/active",
        &[("X-User-Id", "u1")],
    );
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["claims"].as_array().unwrap().len(), 0);
}

#[test]
fn identity_header_is_required_for_claim_routes() {
    let server = start_server(None);
    let (status, _) = post(
        server.port,
        "/servers/s1/claim/initiate",
        &[],
        r#"{"verificationMethod": "MOTD"}"#,
    );
    assert_eq!(status, 401);
    let (status, _) = get(server.port, "/users/me/claims", &[]);
    assert_eq!(status, 401);
}

#[test]
fn bad_method_name_is_rejected() {
    let server = start_server(None);
    let (status, body) = post(
        server.port,
        "/servers/s1/claim/initiate",
        &[("X-User-Id", "u1")],
        r#"{"verificationMethod": "CARRIER_PIGEON"}"#,
    );
    assert_eq!(status, 400, "body: {}", body);
}

#[test]
fn admin_surface_requires_the_configured_token() {
    let server = start_server(Some("sekrit"));

    let (status, _) = get(server.port, "/admin/claims/stats", &[]);
    assert_eq!(status, 401);

    let (status, _) = get(
        server.port,
        "/admin/claims/stats",
        &[("X-Admin-Token", "wrong")],
    );
    assert_eq!(status, 403);

    let (status, body) = get(
        server.port,
        "/admin/claims/stats",
        &[("X-Admin-Token", "sekrit")],
    );
    assert_eq!(status, 200, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["pendingClaims"], 0);
}

#[test]
fn admin_surface_is_off_without_a_token() {
    let server = start_server(None);
    let (status, _) = get(
        server.port,
        "/admin/claims/stats",
        &[("X-Admin-Token", "anything")],
    );
    assert_eq!(status, 403);
}

#[test]
fn admin_can_list_and_invalidate_claims() {
    let server = start_server(Some("sekrit"));

    let (status, body) = post(
        server.port,
        "/servers/s1/claim/initiate",
        &[("X-User-Id", "u1")],
        r#"{"verificationMethod": "DNS_TXT"}"#,
    );
    assert_eq!(status, 201, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    let claim_id = json["claimId"].as_str().unwrap().to_string();

    let (status, body) = get(
        server.port,
        "/admin/claims?status=PENDING",
        &[("X-Admin-Token", "sekrit")],
    );
    assert_eq!(status, 200, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["total"], 1);
    assert_eq!(json["claims"][0]["claimId"], claim_id.as_str());

    // Invalidation needs the admin's identity for the audit trail
    let (status, _) = http_request(
        server.port,
        "DELETE",
        &format!("/admin/claims/{}", claim_id),
        &[("X-Admin-Token", "sekrit")],
        None,
    );
    assert_eq!(status, 400);

    let (status, body) = http_request(
        server.port,
        "DELETE",
        &format!("/admin/claims/{}", claim_id),
        &[("X-Admin-Token", "sekrit"), ("X-Admin-Id", "admin-1")],
        None,
    );
    assert_eq!(status, 200, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "CANCELLED");
}

#[test]
fn admin_approves_an_email_claim() {
    let server = start_server(Some("sekrit"));

    let (status, body) = post(
        server.port,
        "/servers/s1/claim/initiate",
        &[("X-User-Id", "u1")],
        r#"{"verificationMethod": "EMAIL"}"#,
    );
    assert_eq!(status, 201, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    let claim_id = json["claimId"].as_str().unwrap().to_string();

    let (status, body) = post(
        server.port,
        &format!("/admin/claims/{}/approve", claim_id),
        &[("X-Admin-Token", "sekrit"), ("X-Admin-Id", "admin-1")],
        "",
    );
    assert_eq!(status, 200, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "VERIFIED");

    // The server's claim roster now shows the verified claim
    let (status, body) = get(
        server.port,
        "/admin/claims/server/s1",
        &[("X-Admin-Token", "sekrit")],
    );
    assert_eq!(status, 200, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["pendingCount"], 0);
    assert_eq!(json["claims"][0]["status"], "VERIFIED");

    // And a fresh claim on the now-owned server conflicts
    let (status, _) = post(
        server.port,
        "/servers/s1/claim/initiate",
        &[("X-User-Id", "u1")],
        r#"{"verificationMethod": "MOTD"}"#,
    );
    assert_eq!(status, 409);
}

#[test]
fn admin_maintenance_endpoints_report_counts() {
    let server = start_server(Some("sekrit"));

    let (status, body) = post(
        server.port,
        "/admin/claims/expire-pending",
        &[("X-Admin-Token", "sekrit")],
        "",
    );
    assert_eq!(status, 200, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["expired"], 0);

    let (status, body) = http_request(
        server.port,
        "DELETE",
        "/admin/claims/cleanup?daysToKeep=30",
        &[("X-Admin-Token", "sekrit")],
        None,
    );
    assert_eq!(status, 200, "body: {}", body);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["deleted"], 0);

    // A nonsensical horizon is rejected
    let (status, _) = http_request(
        server.port,
        "DELETE",
        "/admin/claims/cleanup?daysToKeep=0",
        &[("X-Admin-Token", "sekrit")],
        None,
    );
    assert_eq!(status, 400);
}
