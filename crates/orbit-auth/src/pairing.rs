//! One-time pairing codes (§4.9): `admin/pair/new` mints a session token
//! and a short code mapping to it; `pair/consume` exchanges the code for
//! the token exactly once.
//!
//! Codes live in memory only — losing them on restart just means an
//! in-flight pairing has to be restarted, which is an acceptable cost for
//! not persisting a secret whose whole purpose is to be short-lived.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use data_encoding::BASE32_NOPAD;
use rand::RngCore;

/// How long a pairing code stays valid if nobody consumes it.
pub const PAIRING_CODE_TTL: Duration = Duration::from_secs(10 * 60);

struct PendingPairing {
    raw_token: String,
    expires_at: Instant,
}

/// Tracks outstanding pairing codes.
#[derive(Default)]
pub struct PairingCodes {
    codes: DashMap<String, PendingPairing>,
}

impl PairingCodes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh code mapping to `raw_token` and record it.
    pub fn mint(&self, raw_token: impl Into<String>) -> String {
        let code = generate_code();
        self.codes.insert(
            code.clone(),
            PendingPairing { raw_token: raw_token.into(), expires_at: Instant::now() + PAIRING_CODE_TTL },
        );
        code
    }

    /// Exchange `code` for its token, exactly once. Returns `None` if the
    /// code is unknown, already consumed, or expired.
    pub fn consume(&self, code: &str) -> Option<String> {
        let (_, pending) = self.codes.remove(code)?;
        if pending.expires_at < Instant::now() {
            return None;
        }
        Some(pending.raw_token)
    }

    /// Drop every outstanding code. Called on legacy-token rotation
    /// (§4.9: "pairing codes are cleared").
    pub fn clear(&self) {
        self.codes.clear();
    }
}

fn generate_code() -> String {
    let mut bytes = [0u8; 5];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_returns_token_exactly_once() {
        let codes = PairingCodes::new();
        let code = codes.mint("secret-token");

        assert_eq!(codes.consume(&code), Some("secret-token".to_string()));
        assert_eq!(codes.consume(&code), None);
    }

    #[test]
    fn unknown_code_returns_none() {
        let codes = PairingCodes::new();
        assert_eq!(codes.consume("ghost"), None);
    }

    #[test]
    fn clear_drops_all_outstanding_codes() {
        let codes = PairingCodes::new();
        let code = codes.mint("secret-token");
        codes.clear();
        assert_eq!(codes.consume(&code), None);
    }
}
