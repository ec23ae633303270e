//! `GET/PATCH /api/config/providers` (§6): read a masked view of each
//! provider's launch parameters, or merge-write a patch into one.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::RelayError;
use crate::http::{require_any_scope, require_full_scope};
use crate::state::RelayState;

/// A provider config with its secret fields replaced by presence flags —
/// never echo an API key back over the wire once it's been set.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MaskedProviderConfig {
    enabled: bool,
    executable_path: Option<std::path::PathBuf>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    api_key_set: bool,
}

impl From<&ProviderConfig> for MaskedProviderConfig {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            enabled: config.enabled,
            executable_path: config.executable_path.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            api_key_set: config.api_key.is_some(),
        }
    }
}

/// `GET /api/config/providers`.
pub async fn list(State(state): State<RelayState>, headers: HeaderMap) -> Result<Json<HashMap<String, MaskedProviderConfig>>, RelayError> {
    require_any_scope(&state, &headers).await?;
    let providers = state.provider_configs().await;
    Ok(Json(providers.iter().map(|(id, config)| (id.clone(), MaskedProviderConfig::from(config))).collect()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchProviderRequest {
    #[serde(default)]
    enabled: bool,
    executable_path: Option<std::path::PathBuf>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

/// `PATCH /api/config/providers`: merge-write one or more providers'
/// configs by id. Each provider's config is replaced wholesale (the admin
/// UI always sends the full record it was shown, with the real key
/// re-entered if it's changing — there is no partial per-field merge
/// beyond "which providers this patch touches").
///
/// # Errors
///
/// [`RelayError::BadRequest`] if any `executablePath` is set but does not
/// exist, so a typo is caught at config-write time rather than at the
/// next adapter spawn.
pub async fn patch(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(body): Json<HashMap<String, PatchProviderRequest>>,
) -> Result<Json<HashMap<String, MaskedProviderConfig>>, RelayError> {
    require_full_scope(&state, &headers).await?;

    let mut masked = HashMap::with_capacity(body.len());
    for (provider_id, patch) in body {
        if let Some(path) = &patch.executable_path {
            if !path.exists() {
                return Err(RelayError::BadRequest(format!("executablePath does not exist for {provider_id}: {}", path.display())));
            }
        }

        let config = ProviderConfig {
            enabled: patch.enabled,
            executable_path: patch.executable_path,
            api_key: patch.api_key,
            model: patch.model,
            timeout_secs: patch.timeout_secs,
        };
        masked.insert(provider_id.clone(), MaskedProviderConfig::from(&config));
        state.patch_provider_config(&provider_id, config).await?;
    }

    Ok(Json(masked))
}
