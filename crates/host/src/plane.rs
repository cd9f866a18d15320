//! Control plane and trust store traits
//!
//! The engine never talks to the host directly; it opens a scoped
//! [`HostSession`] per logical operation and releases it on every exit path
//! by dropping it. Mutations are queued inside the session and applied
//! atomically by [`HostSession::commit`]; `start_site`, `stop_site` and
//! `recycle_pool` take effect immediately, matching the host's behavior.

use crate::Result;
use crate::records::{CertificateRecord, SiteRecord};

/// Entry point to the host control plane.
///
/// `open` performs the structural precondition check: if the host is missing
/// entirely, or an unsupported variant is detected, it fails with
/// [`HostError::Unsupported`](crate::HostError::Unsupported) and no session
/// is produced.
pub trait ControlPlane: Send + Sync {
    fn open(&self) -> Result<Box<dyn HostSession + '_>>;
}

/// A scoped handle to the host, alive for one logical operation.
///
/// Reads always reflect current host state plus any mutations staged in this
/// session. State reads (`site_state`, `pool_state`) may fail with
/// [`HostError::NotReady`](crate::HostError::NotReady) while the host is
/// still converging after a commit.
pub trait HostSession {
    // Reads

    fn sites(&self) -> Result<Vec<SiteRecord>>;

    fn site_by_id(&self, id: u32) -> Result<Option<SiteRecord>>;

    fn site_by_name(&self, name: &str) -> Result<Option<SiteRecord>>;

    /// Run state of a site, in host vocabulary.
    fn site_state(&self, id: u32) -> Result<String>;

    fn pool_names(&self) -> Result<Vec<String>>;

    /// Run state of an application pool, in host vocabulary.
    fn pool_state(&self, name: &str) -> Result<String>;

    // Queued mutations, applied by `commit`

    /// Create a site with exactly one initial binding (host API constraint)
    /// and return the host-assigned id.
    fn create_site(
        &mut self,
        name: &str,
        protocol: &str,
        binding_info: &str,
        physical_path: &str,
    ) -> Result<u32>;

    fn set_site_name(&mut self, id: u32, name: &str) -> Result<()>;

    /// Overwrite the physical path of the primary application.
    fn set_physical_path(&mut self, id: u32, path: &str) -> Result<()>;

    /// Overwrite the application pool of the primary application.
    fn set_site_pool(&mut self, id: u32, pool: &str) -> Result<()>;

    fn clear_bindings(&mut self, id: u32) -> Result<()>;

    fn add_binding(&mut self, id: u32, info: &str, protocol: &str) -> Result<()>;

    /// Add a binding with an associated certificate, identified by its raw
    /// hash in the machine trust store.
    fn add_binding_with_certificate(&mut self, id: u32, info: &str, hash: &[u8]) -> Result<()>;

    fn add_application(&mut self, id: u32, path: &str, disk_path: &str, pool: &str) -> Result<()>;

    /// Overwrite disk path and pool of an existing application, addressed by
    /// its virtual path.
    fn update_application(
        &mut self,
        id: u32,
        path: &str,
        disk_path: &str,
        pool: &str,
    ) -> Result<()>;

    fn delete_application(&mut self, id: u32, path: &str) -> Result<()>;

    fn create_pool(&mut self, name: &str) -> Result<()>;

    fn delete_pool(&mut self, name: &str) -> Result<()>;

    fn delete_site(&mut self, id: u32) -> Result<()>;

    /// Apply all queued mutations atomically.
    fn commit(&mut self) -> Result<()>;

    // Immediate operations

    fn start_site(&mut self, id: u32) -> Result<()>;

    fn stop_site(&mut self, id: u32) -> Result<()>;

    fn recycle_pool(&mut self, name: &str) -> Result<()>;
}

/// Read-only enumeration of the local machine's certificate store.
///
/// The store is externally mutable, so every call re-reads it; nothing is
/// cached between calls.
pub trait TrustStore: Send + Sync {
    fn certificates(&self) -> Result<Vec<CertificateRecord>>;
}
