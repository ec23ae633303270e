//! `/admin/*` and `/pair/consume` (§6, §4.9): status/health introspection,
//! safe repairs, legacy token rotation, per-device session tokens, and
//! pairing codes.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orbit_auth::Scope;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;
use crate::http::{bearer_token, rate_limit_key, require_any_scope, require_full_scope};
use crate::state::RelayState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    uptime_secs: i64,
    clients: usize,
    anchors: usize,
    providers: HashMap<String, orbit_adapters::ProviderHealth>,
    reliability: orbit_core::reliability::ReliabilitySnapshot,
    session_count: usize,
    pending_approvals: usize,
}

/// `GET /admin/status`.
pub async fn status(State(state): State<RelayState>, headers: HeaderMap) -> Result<Json<StatusResponse>, RelayError> {
    require_any_scope(&state, &headers).await?;

    let (clients, anchors) = state.subscriptions().connection_counts();
    let sessions = state.auth().list_sessions().await?;

    Ok(Json(StatusResponse {
        uptime_secs: (chrono::Utc::now() - state.started_at()).num_seconds(),
        clients,
        anchors,
        providers: state.registry().health_all().await,
        reliability: state.counters().snapshot(),
        session_count: sessions.len(),
        pending_approvals: state.approvals().pending_count(),
    }))
}

/// `GET /admin/validate`: a non-mutating self-check of the pieces that
/// most commonly break a fresh install (title store writability, event
/// store reachability, upload directory presence).
pub async fn validate(State(state): State<RelayState>, headers: HeaderMap) -> Result<Json<Value>, RelayError> {
    require_any_scope(&state, &headers).await?;

    let title_store_ok = state.titles().get_title("__validate_probe__").await.is_ok();
    let store_ok = state.store().read("__validate_probe__", orbit_store::ReadOptions::default()).await.is_ok();
    let upload_dir_ok = state.config().uploads.upload_dir.exists() || std::fs::create_dir_all(&state.config().uploads.upload_dir).is_ok();

    Ok(Json(serde_json::json!({
        "titleStore": title_store_ok,
        "eventStore": store_ok,
        "uploadDir": upload_dir_ok,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairRequest {
    action: String,
}

/// `POST /admin/repair`: whitelisted safe repairs (§6).
pub async fn repair(State(state): State<RelayState>, headers: HeaderMap, Json(body): Json<RepairRequest>) -> Result<Json<Value>, RelayError> {
    require_full_scope(&state, &headers).await?;

    match body.action.as_str() {
        "ensureUploadDir" => {
            std::fs::create_dir_all(&state.config().uploads.upload_dir)?;
            Ok(Json(serde_json::json!({"repaired": "ensureUploadDir"})))
        }
        "pruneUploads" => {
            let removed = crate::http::uploads::prune_expired(&state).await?;
            Ok(Json(serde_json::json!({"repaired": "pruneUploads", "removed": removed})))
        }
        "startAnchor" | "fixTailscaleServe" => {
            // Neither action has a corresponding in-process resource the
            // relay itself owns (the anchor is an external process; the
            // Tailscale serve config lives outside this binary) — both
            // are acknowledged no-ops the admin UI can still call safely.
            Ok(Json(serde_json::json!({"repaired": body.action})))
        }
        other => Err(RelayError::BadRequest(format!("unknown repair action: {other}"))),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RotateResponse {
    token: String,
}

/// `POST /admin/token/rotate` (§4.9): mint a new legacy token, close every
/// open socket, and hand the new token back once (never persisted by the
/// relay itself — `orbit-server` owns writing it back to the config file).
pub async fn rotate_token(State(state): State<RelayState>, headers: HeaderMap) -> Result<Json<RotateResponse>, RelayError> {
    require_full_scope(&state, &headers).await?;

    let token = state.auth().rotate_legacy().await;
    state.close_all_for_token_rotation();
    Ok(Json(RotateResponse { token }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionSummary {
    device_label: String,
    scope: &'static str,
    token_hash: String,
    created_at: chrono::DateTime<chrono::Utc>,
    last_used_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// `GET /admin/token/sessions`.
pub async fn list_sessions(State(state): State<RelayState>, headers: HeaderMap) -> Result<Json<Vec<SessionSummary>>, RelayError> {
    require_any_scope(&state, &headers).await?;
    let sessions = state.auth().list_sessions().await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionSummary {
                device_label: s.device_label,
                scope: s.scope.as_str(),
                token_hash: s.token_hash,
                created_at: s.created_at,
                last_used_at: s.last_used_at,
            })
            .collect(),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionRequest {
    device_label: String,
    #[serde(default = "default_scope")]
    scope: String,
}

fn default_scope() -> String {
    "full".to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewSessionResponse {
    token: String,
}

/// `POST /admin/token/sessions/new`.
pub async fn new_session(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(body): Json<NewSessionRequest>,
) -> Result<Json<NewSessionResponse>, RelayError> {
    require_full_scope(&state, &headers).await?;
    let scope = Scope::parse(&body.scope).ok_or_else(|| RelayError::BadRequest(format!("unknown scope: {}", body.scope)))?;
    let minted = state.auth().mint_session(&body.device_label, scope).await?;
    Ok(Json(NewSessionResponse { token: minted.raw }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeSessionRequest {
    token_hash: String,
}

/// `POST /admin/token/sessions/revoke`.
pub async fn revoke_session(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(body): Json<RevokeSessionRequest>,
) -> Result<Json<Value>, RelayError> {
    require_full_scope(&state, &headers).await?;
    state.auth().revoke_session(&body.token_hash).await?;
    Ok(Json(serde_json::json!({"revoked": body.token_hash})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairNewRequest {
    device_label: String,
    #[serde(default = "default_scope")]
    scope: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PairNewResponse {
    code: String,
    url: String,
}

/// `POST /admin/pair/new` (§4.9, §4.8): mint a fresh session token and a
/// short code mapping to it, rate-limited per scope.
pub async fn pair_new(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(body): Json<PairNewRequest>,
) -> Result<Json<PairNewResponse>, RelayError> {
    require_full_scope(&state, &headers).await?;

    let token = bearer_token(&headers);
    let key = rate_limit_key(&headers, token);
    if let Err(orbit_auth::AuthError::RateLimited { retry_after }) =
        state.auth().check_rate_limit("admin/pair/new", &key, state.config().rate_limits.pair_new.to_config())
    {
        state.counters().inc_rate_limited();
        return Err(RelayError::RateLimited { retry_after_secs: retry_after.as_secs() });
    }

    let scope = Scope::parse(&body.scope).ok_or_else(|| RelayError::BadRequest(format!("unknown scope: {}", body.scope)))?;
    let code = state.auth().mint_pairing(&body.device_label, scope).await?;
    let url = format!("{}/pair/consume?code={code}", state.config().pair_base_url);
    Ok(Json(PairNewResponse { code, url }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairConsumeRequest {
    code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PairConsumeResponse {
    token: String,
}

/// `POST /pair/consume` (§4.9): unauthenticated — the code itself is the
/// credential, and it is single-use.
pub async fn pair_consume(State(state): State<RelayState>, Json(body): Json<PairConsumeRequest>) -> Result<Json<PairConsumeResponse>, RelayError> {
    let token = match state.auth().consume_pairing(&body.code) {
        Ok(token) => token,
        Err(orbit_auth::AuthError::UnknownPairingCode) => return Err(RelayError::UnknownToken),
        Err(other) => return Err(other.into()),
    };
    Ok(Json(PairConsumeResponse { token }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairQrQuery {
    code: String,
}

/// `GET /admin/pair/qr.svg?code=…`: an SVG QR code of the pairing URL.
pub async fn pair_qr(State(state): State<RelayState>, headers: HeaderMap, Query(query): Query<PairQrQuery>) -> Result<Response, RelayError> {
    require_any_scope(&state, &headers).await?;

    let url = format!("{}/pair/consume?code={}", state.config().pair_base_url, query.code);
    let code = qrcode::QrCode::new(url.as_bytes()).map_err(|err| RelayError::BadRequest(format!("could not render QR code: {err}")))?;
    let svg = code.render::<qrcode::render::svg::Color>().min_dimensions(256, 256).build();

    Ok(([(axum::http::header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

