//! Ties together the legacy bootstrap token, per-device session tokens,
//! pairing codes, upload tokens, and the rate limiter (§4.8, §4.9).
//!
//! Socket closing on rotation and config-file persistence are the
//! caller's concern (the relay owns connections, the server owns the
//! config file) — this manager only ever swaps the in-memory token and
//! reports the new value back.

use std::time::Duration;

use chrono::{DateTime, Utc};
use orbit_store::EventStore;
use tokio::sync::RwLock;

use crate::error::{AuthError, AuthResult};
use crate::pairing::PairingCodes;
use crate::rate_limit::{RateLimitConfig, RateLimitResult, RateLimiter};
use crate::token::{constant_time_eq, hash_token, mint_token, MintedToken, Scope};

/// Default lifetime for a minted upload token (§6: `uploadRetentionDays`
/// governs uploaded *files*; the token that authorizes the upload itself
/// is short-lived regardless of that setting).
pub const UPLOAD_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// A live per-device session token, as read back from `token_sessions`.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub token_hash: String,
    pub device_label: String,
    pub scope: Scope,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Owns the relay's auth state: the legacy token, session tokens, pairing
/// codes, upload tokens, and rate limiting.
pub struct AuthManager {
    legacy_token: RwLock<String>,
    store: EventStore,
    pairing: PairingCodes,
    rate_limiter: RateLimiter,
}

impl AuthManager {
    #[must_use]
    pub fn new(legacy_token: String, store: EventStore) -> Self {
        Self { legacy_token: RwLock::new(legacy_token), store, pairing: PairingCodes::new(), rate_limiter: RateLimiter::new() }
    }

    /// Constant-time compare against the current legacy token.
    pub async fn verify_legacy(&self, candidate: &str) -> bool {
        constant_time_eq(&*self.legacy_token.read().await, candidate)
    }

    /// Replace the legacy token with a fresh random one and clear
    /// outstanding pairing codes. Returns the new raw token so the caller
    /// can persist it to the config file and close live sockets.
    pub async fn rotate_legacy(&self) -> String {
        let minted = mint_token();
        *self.legacy_token.write().await = minted.raw.clone();
        self.pairing.clear();
        minted.raw
    }

    /// Mint a new per-device session token with the given scope.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Database`] on a write failure.
    pub async fn mint_session(&self, device_label: &str, scope: Scope) -> AuthResult<MintedToken> {
        let minted = mint_token();
        let now = Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO token_sessions (token_hash, device_label, scope, created_at, last_used_at) VALUES (?, ?, ?, ?, NULL)")
            .bind(&minted.hash)
            .bind(device_label)
            .bind(scope.as_str())
            .bind(&now)
            .execute(self.store.pool())
            .await?;
        Ok(minted)
    }

    /// Look up a session token by its raw value, touching `last_used_at`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] if no live session matches.
    pub async fn verify_session(&self, raw: &str) -> AuthResult<SessionRecord> {
        let hash = hash_token(raw);
        let row: Option<(String, String, String, String, Option<String>)> = sqlx::query_as(
            "SELECT token_hash, device_label, scope, created_at, last_used_at FROM token_sessions WHERE token_hash = ?",
        )
        .bind(&hash)
        .fetch_optional(self.store.pool())
        .await?;

        let (token_hash, device_label, scope, created_at, last_used_at) = row.ok_or(AuthError::InvalidToken)?;

        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE token_sessions SET last_used_at = ? WHERE token_hash = ?").bind(&now).bind(&token_hash).execute(self.store.pool()).await?;

        Ok(SessionRecord {
            token_hash,
            device_label,
            scope: Scope::parse(&scope).unwrap_or(Scope::ReadOnly),
            created_at: parse_rfc3339(&created_at),
            last_used_at: last_used_at.as_deref().map(parse_rfc3339),
        })
    }

    /// Revoke a session by its hash (as returned in [`SessionRecord`]).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownSession`] if no row matches.
    pub async fn revoke_session(&self, token_hash: &str) -> AuthResult<()> {
        let result = sqlx::query("DELETE FROM token_sessions WHERE token_hash = ?").bind(token_hash).execute(self.store.pool()).await?;
        if result.rows_affected() == 0 {
            return Err(AuthError::UnknownSession(token_hash.to_string()));
        }
        Ok(())
    }

    /// List every live session token (never the raw value, only metadata).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Database`] on a query failure.
    pub async fn list_sessions(&self) -> AuthResult<Vec<SessionRecord>> {
        let rows: Vec<(String, String, String, String, Option<String>)> =
            sqlx::query_as("SELECT token_hash, device_label, scope, created_at, last_used_at FROM token_sessions ORDER BY created_at ASC")
                .fetch_all(self.store.pool())
                .await?;
        Ok(rows
            .into_iter()
            .map(|(token_hash, device_label, scope, created_at, last_used_at)| SessionRecord {
                token_hash,
                device_label,
                scope: Scope::parse(&scope).unwrap_or(Scope::ReadOnly),
                created_at: parse_rfc3339(&created_at),
                last_used_at: last_used_at.as_deref().map(parse_rfc3339),
            })
            .collect())
    }

    /// Mint a session token and a one-time pairing code mapping to it
    /// (§4.9).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Database`] on a write failure.
    pub async fn mint_pairing(&self, device_label: &str, scope: Scope) -> AuthResult<String> {
        let minted = self.mint_session(device_label, scope).await?;
        Ok(self.pairing.mint(minted.raw))
    }

    /// Exchange a pairing code for its token, exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownPairingCode`] if the code is unknown,
    /// already consumed, or expired.
    pub fn consume_pairing(&self, code: &str) -> AuthResult<String> {
        self.pairing.consume(code).ok_or(AuthError::UnknownPairingCode)
    }

    /// Mint a single-use upload token, valid for [`UPLOAD_TOKEN_TTL`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Database`] on a write failure.
    pub async fn mint_upload_token(&self) -> AuthResult<String> {
        let minted = mint_token();
        let now = Utc::now();
        let expires_at = (now + chrono::Duration::from_std(UPLOAD_TOKEN_TTL).unwrap_or_default()).to_rfc3339();
        sqlx::query("INSERT INTO upload_tokens (token_hash, created_at, expires_at, consumed_at) VALUES (?, ?, ?, NULL)")
            .bind(&minted.hash)
            .bind(now.to_rfc3339())
            .bind(&expires_at)
            .execute(self.store.pool())
            .await?;
        Ok(minted.raw)
    }

    /// Consume an upload token, failing if it is unknown, expired, or
    /// already used.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownUploadToken`].
    pub async fn consume_upload_token(&self, raw: &str) -> AuthResult<()> {
        let hash = hash_token(raw);
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT expires_at, consumed_at FROM upload_tokens WHERE token_hash = ?").bind(&hash).fetch_optional(self.store.pool()).await?;
        let (expires_at, consumed_at) = row.ok_or(AuthError::UnknownUploadToken)?;
        if consumed_at.is_some() || parse_rfc3339(&expires_at) < Utc::now() {
            return Err(AuthError::UnknownUploadToken);
        }
        sqlx::query("UPDATE upload_tokens SET consumed_at = ? WHERE token_hash = ?").bind(Utc::now().to_rfc3339()).bind(&hash).execute(self.store.pool()).await?;
        Ok(())
    }

    /// Admit or deny a request against a rate-limit scope (§4.8).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RateLimited`] on exhaustion.
    pub fn check_rate_limit(&self, scope: &str, key: &str, config: RateLimitConfig) -> AuthResult<()> {
        match self.rate_limiter.check(scope, key, config) {
            RateLimitResult::Allowed => Ok(()),
            RateLimitResult::Denied { retry_after } => Err(AuthError::RateLimited { retry_after }),
        }
    }
}

fn parse_rfc3339(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimitConfig;

    async fn manager() -> AuthManager {
        let store = EventStore::connect_memory().await.unwrap();
        AuthManager::new("bootstrap-secret".to_string(), store)
    }

    #[tokio::test]
    async fn verifies_the_legacy_token() {
        let auth = manager().await;
        assert!(auth.verify_legacy("bootstrap-secret").await);
        assert!(!auth.verify_legacy("wrong").await);
    }

    #[tokio::test]
    async fn rotation_invalidates_the_old_legacy_token() {
        let auth = manager().await;
        let new_token = auth.rotate_legacy().await;

        assert!(!auth.verify_legacy("bootstrap-secret").await);
        assert!(auth.verify_legacy(&new_token).await);
    }

    #[tokio::test]
    async fn rotation_clears_outstanding_pairing_codes() {
        let auth = manager().await;
        let code = auth.mint_pairing("phone", Scope::Full).await.unwrap();

        auth.rotate_legacy().await;

        assert!(matches!(auth.consume_pairing(&code), Err(AuthError::UnknownPairingCode)));
    }

    #[tokio::test]
    async fn mint_and_verify_session_round_trips() {
        let auth = manager().await;
        let minted = auth.mint_session("laptop", Scope::ReadOnly).await.unwrap();

        let record = auth.verify_session(&minted.raw).await.unwrap();
        assert_eq!(record.device_label, "laptop");
        assert_eq!(record.scope, Scope::ReadOnly);
        assert!(record.last_used_at.is_some());
    }

    #[tokio::test]
    async fn verify_session_rejects_unknown_token() {
        let auth = manager().await;
        assert!(matches!(auth.verify_session("never-minted").await, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn revoke_session_removes_it() {
        let auth = manager().await;
        let minted = auth.mint_session("laptop", Scope::Full).await.unwrap();
        auth.revoke_session(&minted.hash).await.unwrap();

        assert!(matches!(auth.verify_session(&minted.raw).await, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn pairing_exchanges_code_for_the_minted_session_token_once() {
        let auth = manager().await;
        let code = auth.mint_pairing("tablet", Scope::Full).await.unwrap();

        let raw = auth.consume_pairing(&code).unwrap();
        let record = auth.verify_session(&raw).await.unwrap();
        assert_eq!(record.device_label, "tablet");

        assert!(matches!(auth.consume_pairing(&code), Err(AuthError::UnknownPairingCode)));
    }

    #[tokio::test]
    async fn upload_token_is_single_use() {
        let auth = manager().await;
        let raw = auth.mint_upload_token().await.unwrap();

        auth.consume_upload_token(&raw).await.unwrap();
        assert!(matches!(auth.consume_upload_token(&raw).await, Err(AuthError::UnknownUploadToken)));
    }

    #[tokio::test]
    async fn rate_limit_denies_past_the_configured_max() {
        let auth = manager().await;
        let config = RateLimitConfig::new(1, Duration::from_secs(60));

        auth.check_rate_limit("uploads/new", "client-a", config).unwrap();
        assert!(matches!(auth.check_rate_limit("uploads/new", "client-a", config), Err(AuthError::RateLimited { .. })));
    }
}
