//! Provider registry (§4.4): config-driven adapter construction,
//! concurrent start/stop, and health/capability aggregation across every
//! configured provider.

#![deny(unsafe_code)]

mod config;
mod error;
mod registry;

pub use config::resolve_enabled;
pub use error::{RegistryError, RegistryResult};
pub use registry::{AdapterFactory, ProviderEntry, Registry, STOP_GRACE};
