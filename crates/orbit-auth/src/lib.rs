//! Orbit Auth — the legacy bootstrap token, per-device session tokens,
//! pairing codes, upload tokens, and the rate limiter (§4.8, §4.9).

#![deny(unsafe_code)]

mod error;
mod manager;
mod pairing;
mod rate_limit;
mod token;

pub use error::{AuthError, AuthResult};
pub use manager::{AuthManager, SessionRecord, UPLOAD_TOKEN_TTL};
pub use pairing::PAIRING_CODE_TTL;
pub use rate_limit::{RateLimitConfig, RateLimitResult, RateLimiter};
pub use token::{constant_time_eq, hash_token, mint_token, MintedToken, Scope};
