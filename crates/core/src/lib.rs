//! siteman-core: site/binding reconciliation engine
//!
//! This crate converges a host web server toward a caller-supplied desired
//! `Site` description: translating host records into the domain model,
//! detecting binding conflicts before any mutation, creating and updating
//! sites idempotently, and polling for readiness after mutating operations.

mod certs;
mod conflict;
mod error;
mod model;
mod reconciler;
mod settings;
mod translate;

pub use certs::list_certificates;
pub use conflict::find_conflict;
pub use error::CoreError;
pub use model::{
    Binding, Certificate, CreateSiteResult, InstanceState, Protocol, Site, SiteApplication,
    SiteStartResult,
};
pub use reconciler::SiteReconciler;
pub use settings::EngineSettings;
pub use translate::{map_instance_state, site_from_record};

// Re-export the host seam for convenience
pub use siteman_host::{ControlPlane, HostError, HostSession, TrustStore};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, CoreError>;
