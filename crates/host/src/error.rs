//! Error types for siteman-host

use thiserror::Error;

/// Errors surfaced by the host control plane.
///
/// `Unsupported` is structural and raised when a session is opened against a
/// host that is missing or of an unsupported variant. `NotReady` is transient
/// and only ever produced by run-state reads while the host is still
/// converging after a commit; callers poll through it. Everything else maps a
/// concrete host failure.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("host control plane is unavailable or unsupported: {0}")]
    Unsupported(String),

    #[error("host has not converged yet")]
    NotReady,

    #[error("binding is already in use on the host")]
    BindingInUse,

    #[error("site content path cannot be accessed")]
    PathInaccessible,

    #[error("no site with id {0} exists on the host")]
    SiteGone(u32),

    #[error("no application pool named '{0}' exists on the host")]
    PoolGone(String),

    #[error("{0}")]
    Other(String),
}
