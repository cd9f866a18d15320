//! Error types for siteman-core

use thiserror::Error;

/// Errors that can occur in engine operations.
///
/// Expected, recoverable outcomes (binding conflicts, readiness timeouts)
/// are never errors; they come back as
/// [`CreateSiteResult`](crate::CreateSiteResult) /
/// [`SiteStartResult`](crate::SiteStartResult) values so callers can branch
/// without error handling. Everything here is either a distinct addressing
/// failure or a host failure passed through unmodified.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("site '{site}' was not found on the host")]
    SiteNotFound { site: String },

    #[error("no certificate in the trust store matches thumbprint '{thumbprint}'")]
    CertificateNotFound { thumbprint: String },

    #[error("desired site has no bindings")]
    EmptyBindingSet,

    #[error("host error: {0}")]
    Host(#[from] siteman_host::HostError),
}
