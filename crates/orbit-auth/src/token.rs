//! Token generation, hashing, and constant-time comparison (§4.9).
//!
//! Session tokens are 256-bit random values. Only the sha-256 hash is ever
//! persisted; the raw value is handed to the caller once, at mint time (or
//! at pairing-code consumption), and never stored anywhere else.

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// What a session token is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Read and write admission.
    Full,
    /// Read admission only — write RPCs are rejected by the relay's gate.
    ReadOnly,
}

impl Scope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::ReadOnly => "read_only",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "full" => Some(Self::Full),
            "read_only" => Some(Self::ReadOnly),
            _ => None,
        }
    }
}

/// A freshly minted token: the raw value (shown once) and its hash (the
/// only thing ever persisted).
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub raw: String,
    pub hash: String,
}

/// Mint a new 256-bit random token, hex-encoded, with its sha-256 hash
/// (also hex-encoded) ready for storage.
#[must_use]
pub fn mint_token() -> MintedToken {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw = hex::encode(bytes);
    let hash = hash_token(&raw);
    MintedToken { raw, hash }
}

/// Hex-encoded sha-256 hash of `raw`, for lookups against stored tokens.
#[must_use]
pub fn hash_token(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)
}

/// Constant-time string comparison, to avoid leaking the legacy token
/// through a timing side channel on the admin bearer check.
///
/// A length mismatch is checked first (and so is not constant-time with
/// respect to length) — only the byte-for-byte comparison of equal-length
/// candidates needs to resist timing analysis.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
