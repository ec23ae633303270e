//! The relay's REST-shaped HTTP surface (§6): health, admin, thread
//! replay/search/export, provider config, CLI, and uploads.
//!
//! Every handler but `/health`, `/pair/consume`, and `/u/:token` requires
//! a bearer token; most admin-mutating routes additionally require
//! [`orbit_auth::Scope::Full`] — a `read_only` session can inspect status
//! but not rotate tokens, mint pairing codes, or run allow-listed
//! commands.

pub mod admin;
pub mod cli;
pub mod config_providers;
pub mod health;
pub mod threads;
pub mod uploads;

use axum::http::HeaderMap;
use orbit_auth::Scope;

use crate::error::{RelayError, RelayResult};
use crate::state::RelayState;

/// Pull the bearer token from `Authorization: Bearer` (HTTP routes have no
/// `?token=` fallback; that's a WS-only convenience for browsers that
/// can't set headers on an upgrade request).
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

/// Require a bearer token resolving to any scope.
///
/// # Errors
///
/// Returns [`RelayError::Unauthorized`] if the token is missing or
/// invalid.
pub async fn require_any_scope(state: &RelayState, headers: &HeaderMap) -> RelayResult<Scope> {
    crate::ws::resolve_scope(state, bearer_token(headers)).await
}

/// Require a bearer token resolving to [`Scope::Full`] — the gate for
/// admin routes that mutate state (token rotation, pairing, CLI runs,
/// uploads, imports, archiving).
///
/// # Errors
///
/// Returns [`RelayError::Unauthorized`] if the token is missing, invalid,
/// or resolves to [`Scope::ReadOnly`].
pub async fn require_full_scope(state: &RelayState, headers: &HeaderMap) -> RelayResult<()> {
    match require_any_scope(state, headers).await? {
        Scope::Full => Ok(()),
        Scope::ReadOnly => Err(RelayError::ReadOnlyDenied("admin".to_string())),
    }
}

/// Derive the rate-limit key for a request (§4.8): forwarded client IP if
/// present, else the last 8 bytes of the bearer token, else a user-agent
/// prefix.
#[must_use]
pub fn rate_limit_key(headers: &HeaderMap, token: Option<&str>) -> String {
    if let Some(ip) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        return ip.split(',').next().unwrap_or(ip).trim().to_string();
    }
    if let Some(token) = token {
        let tail_start = token.len().saturating_sub(8);
        return token[tail_start..].to_string();
    }
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.chars().take(32).collect())
        .unwrap_or_else(|| "unknown".to_string())
}
