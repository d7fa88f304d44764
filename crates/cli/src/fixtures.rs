//! Fixture loading: seeds the in-memory store with server listings and
//! user accounts from JSON files at startup.
//!
//! In production these records arrive from the directory's main
//! database; the fixture path exists for local development and tests.

use std::path::Path;

use serde::Deserialize;

use holist_storage::{ClaimStore, MemoryStore, ServerRecord, StorageError, UserRecord};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FixtureFile {
    #[serde(default)]
    pub servers: Vec<ServerFixture>,
    #[serde(default)]
    pub users: Vec<UserFixture>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerFixture {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub website_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserFixture {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
}

/// Read and parse a fixture file.
pub(crate) fn load(path: &Path) -> Result<FixtureFile, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading '{}': {}", path.display(), e))?;
    let fixture: FixtureFile = serde_json::from_str(&text)
        .map_err(|e| format!("error parsing '{}': {}", path.display(), e))?;

    for server in &fixture.servers {
        if server.id.is_empty() || server.host.is_empty() {
            return Err(format!(
                "'{}': server entries need non-empty id and host",
                path.display()
            ));
        }
    }
    for user in &fixture.users {
        if user.id.is_empty() || user.username.is_empty() {
            return Err(format!(
                "'{}': user entries need non-empty id and username",
                path.display()
            ));
        }
    }
    Ok(fixture)
}

/// Upsert fixture records into the store. Returns (servers, users) counts.
pub(crate) async fn apply(
    store: &MemoryStore,
    fixture: FixtureFile,
) -> Result<(usize, usize), StorageError> {
    let server_count = fixture.servers.len();
    let user_count = fixture.users.len();

    for server in fixture.servers {
        store
            .upsert_server(ServerRecord {
                id: server.id,
                name: server.name,
                host: server.host,
                port: server.port,
                website_url: server.website_url,
                owner_id: None,
                owner_username: None,
                verified_at: None,
                verification_method: None,
                version: 0,
            })
            .await?;
    }
    for user in fixture.users {
        store
            .upsert_user(UserRecord {
                id: user.id,
                username: user.username,
                email: user.email,
                email_verified: user.email_verified,
            })
            .await?;
    }
    Ok((server_count, user_count))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
