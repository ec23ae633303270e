//! `/threads/:id/events`, `/api/threads/*` (§6): replay, full-text search,
//! export, import, and the archive flag.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::TryStreamExt;
use orbit_store::{EventDirection, ExportFormat, NewEvent, ReadOptions, ReadOrder};
use serde::Deserialize;

use crate::error::RelayError;
use crate::http::{require_any_scope, require_full_scope};
use crate::state::RelayState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    limit: Option<i64>,
    #[serde(default)]
    order: OrderParam,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "lowercase")]
enum OrderParam {
    #[default]
    Asc,
    Desc,
}

/// `GET /threads/:id/events`: `application/x-ndjson`, one event per line.
pub async fn events(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Response, RelayError> {
    require_any_scope(&state, &headers).await?;

    let order = match query.order {
        OrderParam::Asc => ReadOrder::Ascending,
        OrderParam::Desc => ReadOrder::Descending,
    };
    let events = state.store().read(&thread_id, ReadOptions { limit: query.limit, order }).await?;

    let mut body = String::new();
    for event in &events {
        body.push_str(&serde_json::to_string(event)?);
        body.push('\n');
    }

    Ok(([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    q: String,
}

/// `GET /api/threads/:id/search?q=…`: full-text search results as a JSON
/// array.
pub async fn search(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<orbit_store::StoredEvent>>, RelayError> {
    require_any_scope(&state, &headers).await?;
    let results = state.store().search(&thread_id, &query.q).await?;
    Ok(Json(results))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    format: ExportFormatParam,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormatParam {
    Json,
    Markdown,
}

/// `GET /api/threads/:id/export?format=json|markdown`: streamed so a long
/// thread doesn't have to be buffered into memory before the first byte
/// reaches the client.
pub async fn export(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, RelayError> {
    require_any_scope(&state, &headers).await?;

    let (format, content_type) = match query.format {
        ExportFormatParam::Json => (ExportFormat::Json, "application/x-ndjson"),
        ExportFormatParam::Markdown => (ExportFormat::Markdown, "text/markdown"),
    };
    let stream = state.store().export(&thread_id, format).await?;
    let body = axum::body::Body::from_stream(stream.map_err(|err| std::io::Error::other(err.to_string())));

    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportEvent {
    turn_id: Option<String>,
    direction: EventDirection,
    role: String,
    method: Option<String>,
    payload: serde_json::Value,
    #[serde(rename = "createdAtSeconds")]
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportResponse {
    thread_id: String,
}

/// `POST /api/threads/import`: re-ingest a previously-exported event list
/// under a freshly minted thread id.
pub async fn import(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(body): Json<Vec<ImportEvent>>,
) -> Result<Json<ImportResponse>, RelayError> {
    require_full_scope(&state, &headers).await?;

    let events = body
        .into_iter()
        .map(|event| NewEvent {
            thread_id: String::new(),
            turn_id: event.turn_id,
            direction: event.direction,
            role: event.role,
            method: event.method,
            payload: event.payload,
            created_at: event.created_at,
        })
        .collect();
    let thread_id = state.store().import(events).await?;
    Ok(Json(ImportResponse { thread_id }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRequest {
    archived: bool,
}

/// `PATCH /api/threads/:id/archive`.
pub async fn archive(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
    Json(body): Json<ArchiveRequest>,
) -> Result<Json<serde_json::Value>, RelayError> {
    require_full_scope(&state, &headers).await?;
    state.store().set_archived(&thread_id, body.archived).await?;
    Ok(Json(serde_json::json!({"threadId": thread_id, "archived": body.archived})))
}

#[cfg(test)]
mod tests {
    use orbit_store::StoredEvent;

    use super::*;

    /// What `GET .../export?format=json` writes for one event must
    /// deserialize straight into `ImportEvent`, since `POST
    /// .../import` is fed exactly that output.
    #[test]
    fn exported_event_json_round_trips_into_import_event() {
        let exported = StoredEvent {
            seq: 1,
            event_id: "evt-1".to_string(),
            thread_id: "t1".to_string(),
            turn_id: Some("turn-1".to_string()),
            direction: EventDirection::Outbound,
            role: "agent".to_string(),
            method: Some("session/update".to_string()),
            payload: serde_json::json!({"text": "hello"}),
            created_at: chrono::Utc::now(),
        };
        let line = serde_json::to_string(&exported).unwrap();

        let imported: ImportEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(imported.turn_id, exported.turn_id);
        assert_eq!(imported.role, exported.role);
        assert_eq!(imported.method, exported.method);
        assert_eq!(imported.payload, exported.payload);
    }
}
