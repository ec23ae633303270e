//! Structured logging setup (§2 ambient logging, §6 "token appearing in
//! logs must be redacted, along with any 64-hex string").
//!
//! Grounded on `astralis-telemetry::logging`'s shape (a `LogConfig`-style
//! enum selecting the output format, installed once at startup over an
//! `EnvFilter` built from `RUST_LOG`), generalized with a custom
//! [`tracing_subscriber::fmt::FormatEvent`] that redacts the legacy token
//! and any bare 64-hex string before a line is ever written — no crate in
//! this workspace offers a ready-made field-redaction layer, so this part
//! is built fresh in the same spirit as `astrid-kernel::secrets::Secrets`
//! (never let a secret's raw value reach an output sink).

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Selects how log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// `level target: message key=value ...`, for a terminal.
    #[default]
    Pretty,
    /// One JSON object per line, for machine-readable log shipping.
    Json,
}

/// Install the global `tracing` subscriber: an `EnvFilter` (default
/// `info`, overridable by `RUST_LOG`) feeding a redacting formatter.
///
/// # Errors
///
/// Returns an error if a global subscriber was already installed.
pub fn init(format: LogFormat, verbose: bool, legacy_token: Option<String>) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let layer = tracing_subscriber::fmt::layer().event_format(RedactingFormat { json: format == LogFormat::Json, token: legacy_token });

    tracing_subscriber::registry().with(filter).with(layer).try_init().map_err(Into::into)
}

/// A `FormatEvent` that collects every field through [`RedactingVisitor`]
/// and renders either a `key=value` line or a JSON object, depending on
/// `json`.
struct RedactingFormat {
    json: bool,
    token: Option<String>,
}

impl<S, N> FormatEvent<S, N> for RedactingFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, _ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &tracing::Event<'_>) -> fmt::Result {
        let mut visitor = RedactingVisitor { token: self.token.as_deref(), fields: Vec::new() };
        event.record(&mut visitor);
        let metadata = event.metadata();

        if self.json {
            let mut object = serde_json::Map::new();
            object.insert("timestamp".to_string(), serde_json::json!(chrono::Utc::now().to_rfc3339()));
            object.insert("level".to_string(), serde_json::json!(metadata.level().as_str()));
            object.insert("target".to_string(), serde_json::json!(metadata.target()));
            for (key, value) in &visitor.fields {
                object.insert(key.clone(), serde_json::json!(value));
            }
            let line = serde_json::to_string(&object).unwrap_or_default();
            writeln!(writer, "{line}")
        } else {
            write!(writer, "{} {} {}:", chrono::Utc::now().to_rfc3339(), metadata.level(), metadata.target())?;
            for (key, value) in &visitor.fields {
                if key == "message" {
                    write!(writer, " {value}")?;
                } else {
                    write!(writer, " {key}={value}")?;
                }
            }
            writeln!(writer)
        }
    }
}

/// Visits every field of an event, redacting string (and debug-formatted)
/// values through [`redact`] before they're stored for rendering.
struct RedactingVisitor<'a> {
    token: Option<&'a str>,
    fields: Vec<(String, String)>,
}

impl Visit for RedactingVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.push((field.name().to_string(), redact(value, self.token)));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let formatted = format!("{value:?}");
        self.fields.push((field.name().to_string(), redact(&formatted, self.token)));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }
}

/// Replace every occurrence of `token` and every run of 64+ hex digits in
/// `value` with `[REDACTED]`. No `regex` dependency in this workspace, so
/// the hex scan is a manual byte walk rather than a compiled pattern.
fn redact(value: &str, token: Option<&str>) -> String {
    const MASK: &str = "[REDACTED]";
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut i = 0;
    while i < bytes.len() {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            if value[i..].starts_with(token) {
                out.push_str(MASK);
                i += token.len();
                continue;
            }
        }
        if bytes[i].is_ascii_hexdigit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                i += 1;
            }
            if i - start >= 64 {
                out.push_str(MASK);
            } else {
                out.push_str(&value[start..i]);
            }
            continue;
        }
        let ch_len = value[i..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&value[i..i + ch_len]);
        i += ch_len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_the_configured_token() {
        assert_eq!(redact("bearer abc123token", Some("abc123token")), "bearer [REDACTED]");
    }

    #[test]
    fn redacts_a_bare_64_hex_string() {
        let hex = "a".repeat(64);
        let input = format!("hash={hex}");
        assert_eq!(redact(&input, None), "hash=[REDACTED]");
    }

    #[test]
    fn leaves_short_hex_runs_alone() {
        let input = "commit abc123";
        assert_eq!(redact(input, None), input);
    }

    #[test]
    fn leaves_ordinary_text_alone() {
        let input = "provider started successfully";
        assert_eq!(redact(input, None), input);
    }
}
