//! Per-provider health, reported by `/admin/health` (§4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A provider's observed health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Healthy {
    /// Fully operational.
    Healthy,
    /// Operational with reduced capability (e.g. binary missing, falling
    /// back to a no-op adapter).
    Degraded,
    /// Not operational.
    Unhealthy,
    /// Not yet checked.
    Unknown,
}

/// A point-in-time health report for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    /// The provider id this report is for.
    pub provider: String,
    /// The health state.
    pub healthy: Healthy,
    /// Human-readable summary.
    pub message: String,
    /// Optional structured detail (last error, binary path, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// When this report was produced.
    pub last_check: DateTime<Utc>,
}

impl ProviderHealth {
    /// A healthy report with no further detail.
    #[must_use]
    pub fn healthy(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            healthy: Healthy::Healthy,
            message: message.into(),
            details: None,
            last_check: Utc::now(),
        }
    }

    /// A degraded report (adapter started but running in a reduced mode).
    #[must_use]
    pub fn degraded(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            healthy: Healthy::Degraded,
            message: message.into(),
            details: None,
            last_check: Utc::now(),
        }
    }

    /// An unhealthy report.
    #[must_use]
    pub fn unhealthy(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            healthy: Healthy::Unhealthy,
            message: message.into(),
            details: None,
            last_check: Utc::now(),
        }
    }

    /// Attach structured detail.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
