//! Standalone Seminar server.
//!
//! Configuration comes from `SEMINAR_*` environment variables:
//!
//! - `SEMINAR_BIND` — live WebSocket listener (default `127.0.0.1:8080`)
//! - `SEMINAR_GATEWAY_BIND` — REST gateway (default `127.0.0.1:8081`)
//! - `SEMINAR_SWEEP_INTERVAL_SECS` — expiry sweep period (default 15)
//! - `SEMINAR_RECEIVE_TIMEOUT_SECS` — idle connection cutoff (default 60)
//! - `SEMINAR_TOKENS` — development token table, `token=user:role:name`
//!   entries separated by `;`. A platform deployment embeds its own
//!   `RoleAuthority` instead.
//!
//! Log filtering follows `RUST_LOG` via `tracing_subscriber::EnvFilter`.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use seminar::{SeminarError, SeminarServer};
use seminar_live::LiveConfig;
use seminar_protocol::Role;
use seminar_session::{Identity, StaticAuthority};
use seminar_store::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), SeminarError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = env_or("SEMINAR_BIND", "127.0.0.1:8080");
    let gateway_bind = env_or("SEMINAR_GATEWAY_BIND", "127.0.0.1:8081");
    let config = LiveConfig {
        sweep_interval: Duration::from_secs(env_secs("SEMINAR_SWEEP_INTERVAL_SECS", 15)?),
        receive_timeout: Duration::from_secs(env_secs("SEMINAR_RECEIVE_TIMEOUT_SECS", 60)?),
    };

    let authority = authority_from_env()?;
    let server = SeminarServer::builder()
        .bind(&bind)
        .gateway_bind(&gateway_bind)
        .live_config(config)
        .build(Arc::new(MemoryStore::new()), Arc::new(authority))
        .await?;

    tracing::info!(%bind, %gateway_bind, "seminar server starting");
    server.run().await
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secs(key: &str, default: u64) -> Result<u64, SeminarError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| SeminarError::Config(format!("{key} must be a number of seconds"))),
        Err(_) => Ok(default),
    }
}

/// Parses `SEMINAR_TOKENS` into a static token table. With no tokens
/// configured, live joins can still authenticate through the gateway's
/// pre-verified identity fallback.
fn authority_from_env() -> Result<StaticAuthority, SeminarError> {
    let mut authority = StaticAuthority::new();
    let Ok(table) = std::env::var("SEMINAR_TOKENS") else {
        tracing::warn!("SEMINAR_TOKENS not set; only pre-verified identities can join");
        return Ok(authority);
    };

    for entry in table.split(';').filter(|e| !e.trim().is_empty()) {
        let (token, identity) = entry
            .split_once('=')
            .ok_or_else(|| bad_token_entry(entry))?;
        let mut fields = identity.splitn(3, ':');
        let (user_id, role, name) = match (fields.next(), fields.next(), fields.next()) {
            (Some(u), Some(r), Some(n)) => (u, r, n),
            _ => return Err(bad_token_entry(entry)),
        };
        let role = parse_role(role).ok_or_else(|| bad_token_entry(entry))?;
        authority = authority.with_token(token.trim(), Identity::new(user_id, role, name));
    }
    Ok(authority)
}

fn parse_role(role: &str) -> Option<Role> {
    match role {
        "student" => Some(Role::Student),
        "instructor" => Some(Role::Instructor),
        "admin" => Some(Role::Admin),
        "superadmin" => Some(Role::Superadmin),
        _ => None,
    }
}

fn bad_token_entry(entry: &str) -> SeminarError {
    SeminarError::Config(format!(
        "SEMINAR_TOKENS entry {entry:?} is not token=user:role:name"
    ))
}
