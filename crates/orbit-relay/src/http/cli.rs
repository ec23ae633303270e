//! `POST /admin/cli/run` (§6): the "CLI execution bridge" — runs one of a
//! configured allow-list of local commands and hands back its captured
//! output. There is no interactive pseudo-terminal here; every allowed
//! command is expected to run to completion and exit, not prompt.

use std::process::Stdio;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::RelayError;
use crate::http::require_full_scope;
use crate::state::RelayState;

/// Upper bound on how long an allow-listed command may run before the
/// relay gives up and kills it. Generous enough for a one-shot provider
/// CLI invocation (e.g. a login/setup flow) without letting a runaway
/// process pin this handler's task forever.
const RUN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliRunRequest {
    command: String,
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CliRunResponse {
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

/// `POST /admin/cli/run`.
///
/// # Errors
///
/// [`RelayError::CommandNotAllowed`] if `command` is not on
/// [`crate::config::RelayConfig::cli_allow_list`]. [`RelayError::Io`] if
/// the process cannot be spawned, or [`RelayError::BadRequest`] if it
/// does not exit within [`RUN_TIMEOUT`].
pub async fn run(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(body): Json<CliRunRequest>,
) -> Result<Json<CliRunResponse>, RelayError> {
    require_full_scope(&state, &headers).await?;

    if !state.config().cli_allow_list.iter().any(|allowed| allowed == &body.command) {
        return Err(RelayError::CommandNotAllowed(body.command));
    }

    let child = Command::new(&body.command)
        .args(&body.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = tokio::time::timeout(RUN_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| RelayError::BadRequest(format!("command timed out after {}s", RUN_TIMEOUT.as_secs())))??;

    Ok(Json(CliRunResponse {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }))
}
