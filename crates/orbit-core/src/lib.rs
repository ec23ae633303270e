//! Orbit Core — shared data model and error taxonomy for the relay.
//!
//! This crate provides:
//! - The provider-agnostic session/event data model (§3 of the design doc)
//! - The `ThreadId` wire-form convention (`"<providerId>:<providerSessionId>"`)
//! - The error kinds shared across the relay's components
//!
//! Every other `orbit-*` crate depends on this one; it depends on nothing
//! internal to the workspace.

#![deny(unsafe_code)]

pub mod capabilities;
pub mod error;
pub mod event;
pub mod ids;
pub mod reliability;
pub mod session;
pub mod thread_id;

pub use capabilities::{NamedFlags, ProviderCapabilities};
pub use error::{CoreError, CoreResult};
pub use event::{EventCategory, NormalizedEvent};
pub use ids::DEFAULT_PROVIDER;
pub use reliability::ReliabilityCounters;
pub use session::{NormalizedSession, SessionStatus};
pub use thread_id::ThreadId;
