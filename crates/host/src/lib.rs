//! siteman-host: host control plane abstraction for siteman
//!
//! This crate defines the seam between the reconciliation engine and the web
//! server's control plane: the [`ControlPlane`] / [`HostSession`] traits, the
//! host-native record types they exchange, and the [`TrustStore`] used for
//! certificate lookups. The [`MemoryHost`] implementation backs local use and
//! every test in the workspace.

mod error;
mod memory;
mod plane;
mod records;

pub use error::HostError;
pub use memory::{MemoryHost, MemoryTrustStore};
pub use plane::{ControlPlane, HostSession, TrustStore};
pub use records::{ApplicationRecord, BindingRecord, CertificateRecord, SiteRecord};

/// Result type for host operations
pub type Result<T> = std::result::Result<T, HostError>;
