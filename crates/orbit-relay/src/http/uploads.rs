//! `/uploads/new`, `/uploads/:token`, `/u/:token` (§6): mint a single-use
//! upload token, `PUT` the body under it, then serve it back by token
//! until it expires or is pruned.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::http::{bearer_token, rate_limit_key, require_any_scope};
use crate::state::RelayState;
use crate::upload_store::UploadRecord;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUploadRequest {
    mime: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewUploadResponse {
    token: String,
    upload_url: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// `POST /uploads/new`: mint a single-use upload token and reserve a spot
/// for its file, rate-limited per §4.8.
pub async fn new_upload(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(body): Json<NewUploadRequest>,
) -> Result<Json<NewUploadResponse>, RelayError> {
    require_any_scope(&state, &headers).await?;

    let token = bearer_token(&headers);
    let key = rate_limit_key(&headers, token);
    if let Err(orbit_auth::AuthError::RateLimited { retry_after }) =
        state.auth().check_rate_limit("uploads/new", &key, state.config().rate_limits.uploads_new.to_config())
    {
        state.counters().inc_rate_limited();
        return Err(RelayError::RateLimited { retry_after_secs: retry_after.as_secs() });
    }

    let raw = state.auth().mint_upload_token().await?;
    let hash = orbit_auth::hash_token(&raw);
    let now = chrono::Utc::now();
    let expires_at = now + chrono::Duration::days(state.config().uploads.retention_days);

    let record = UploadRecord {
        local_path: std::path::PathBuf::from(format!("{}/{}", &hash[..2], &hash[2..])),
        mime: body.mime,
        bytes: None,
        created_at: now,
        expires_at,
    };
    state.uploads().insert(&hash, record).await?;

    Ok(Json(NewUploadResponse { upload_url: format!("/uploads/{raw}"), token: raw, expires_at }))
}

/// `PUT /uploads/:token`: upload the body under a previously-minted
/// token. The `Content-Type` header must match what was declared at mint
/// time; the token is consumed (single-use) whether or not the body
/// ultimately validates.
pub async fn upload_body(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, RelayError> {
    require_any_scope(&state, &headers).await?;

    match state.auth().consume_upload_token(&token).await {
        Ok(()) => {}
        Err(orbit_auth::AuthError::UnknownUploadToken) => return Err(RelayError::UnknownToken),
        Err(other) => return Err(other.into()),
    }

    let hash = orbit_auth::hash_token(&token);
    let record = state.uploads().get(&hash).await?.ok_or(RelayError::UnknownToken)?;

    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default();
    if content_type != record.mime {
        return Err(RelayError::BadRequest(format!("content-type {content_type} does not match declared {}", record.mime)));
    }

    let path = state.config().uploads.upload_dir.join(&record.local_path);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &body).await?;
    state.uploads().mark_uploaded(&hash, body.len() as u64).await?;

    Ok(Json(serde_json::json!({"uploaded": true, "bytes": body.len()})))
}

/// `GET /u/:token`: the capability URL. Unauthenticated by design —
/// possession of the (unguessable) token is the credential (§6 glossary).
pub async fn serve_upload(State(state): State<RelayState>, Path(token): Path<String>) -> Result<Response, RelayError> {
    let hash = orbit_auth::hash_token(&token);
    let record = state.uploads().get(&hash).await?.ok_or(RelayError::UnknownToken)?;

    if record.expires_at < chrono::Utc::now() || record.bytes.is_none() {
        return Err(RelayError::UnknownToken);
    }

    let path = state.config().uploads.upload_dir.join(&record.local_path);
    let bytes = tokio::fs::read(&path).await.map_err(|_| RelayError::UnknownToken)?;

    Ok(([(header::CONTENT_TYPE, record.mime.clone())], bytes).into_response())
}

/// Delete every upload record (and its backing file) whose `expiresAt`
/// has passed. Called from `POST /admin/repair`'s `pruneUploads` action
/// and from the periodic prune sweep `orbit-server` drives.
///
/// # Errors
///
/// Returns an error if the on-disk metadata side-table cannot be read.
pub async fn prune_expired(state: &RelayState) -> Result<u64, RelayError> {
    let expired = state.uploads().expired_before(chrono::Utc::now()).await?;
    let mut removed = 0u64;
    for (hash, record) in expired {
        let path = state.config().uploads.upload_dir.join(&record.local_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(RelayError::Io(err)),
        }
        state.uploads().remove(&hash).await?;
        removed += 1;
    }
    Ok(removed)
}
