//! Provider adapters (§4.3): the uniform `ProviderAdapter` contract plus
//! its two concrete implementations, a subprocess speaking JSON-RPC over
//! stdio (ACP-style: Codex, Copilot) and an HTTP/SSE client (Claude-style).

#![deny(unsafe_code)]

mod acp;
mod adapter;
mod error;
mod health;
mod http;
mod prompt;

pub use acp::{AcpAdapter, AcpAdapterConfig};
pub use adapter::{
    ApprovalOption, ApprovalOutcome, ApprovalRequest, ApprovalRequestHandler, ListSessionsParams, ProviderAdapter,
};
pub use error::{AdapterError, AdapterResult};
pub use health::{Healthy, ProviderHealth};
pub use http::{HttpAdapter, HttpAdapterConfig};
pub use prompt::{Attachment, PromptInput, PromptOptions, TurnAck};
