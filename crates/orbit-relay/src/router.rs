//! Wires every WebSocket and HTTP handler into one `axum::Router` bound
//! to a [`RelayState`] (§6 "External Interfaces").

use axum::routing::{get, patch, post, put};
use axum::Router;

use crate::http;
use crate::state::RelayState;

/// Build the relay's full `axum::Router`. `orbit-server` layers its own
/// `TraceLayer`/`CorsLayer` on top of this and binds it to a listener.
#[must_use]
pub fn build(state: RelayState) -> Router {
    Router::new()
        .route("/ws", get(crate::ws::client::handler))
        .route("/ws/client", get(crate::ws::client::handler))
        .route("/ws/anchor", get(crate::ws::anchor::handler))
        .route("/health", get(http::health::handler))
        .route("/admin/status", get(http::admin::status))
        .route("/admin/validate", get(http::admin::validate))
        .route("/admin/repair", post(http::admin::repair))
        .route("/admin/token/rotate", post(http::admin::rotate_token))
        .route("/admin/token/sessions", get(http::admin::list_sessions))
        .route("/admin/token/sessions/new", post(http::admin::new_session))
        .route("/admin/token/sessions/revoke", post(http::admin::revoke_session))
        .route("/admin/pair/new", post(http::admin::pair_new))
        .route("/pair/consume", post(http::admin::pair_consume))
        .route("/admin/pair/qr.svg", get(http::admin::pair_qr))
        .route("/admin/cli/run", post(http::cli::run))
        .route("/threads/:id/events", get(http::threads::events))
        .route("/api/threads/:id/search", get(http::threads::search))
        .route("/api/threads/:id/export", get(http::threads::export))
        .route("/api/threads/import", post(http::threads::import))
        .route("/api/threads/:id/archive", patch(http::threads::archive))
        .route("/api/config/providers", get(http::config_providers::list).patch(http::config_providers::patch))
        .route("/uploads/new", post(http::uploads::new_upload))
        .route("/uploads/:token", put(http::uploads::upload_body))
        .route("/u/:token", get(http::uploads::serve_upload))
        .with_state(state)
}
