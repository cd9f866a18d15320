//! In-memory control plane and trust store
//!
//! [`MemoryHost`] models the host's commit semantics: a session clones the
//! current state into a private view, mutates that view, and `commit`
//! publishes the whole view back (last writer wins, exactly like the real
//! control plane). A configurable convergence delay makes run-state reads of
//! freshly committed sites fail with [`HostError::NotReady`] for a while,
//! which is what the readiness poll in the engine exists to absorb.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::HostError;
use crate::plane::{ControlPlane, HostSession, TrustStore};
use crate::records::{ApplicationRecord, BindingRecord, CertificateRecord, SiteRecord};
use crate::Result;

#[derive(Debug, Clone, Default)]
struct HostState {
    sites: Vec<SiteRecord>,
    pools: Vec<String>,
    recycles: HashMap<String, u32>,
}

/// In-memory host control plane.
///
/// Doubles as the local backend and the test double for the reconciliation
/// engine. Behavior knobs (`set_never_converges`, `mark_path_unreadable`)
/// simulate the host failure modes the engine has to handle.
pub struct MemoryHost {
    state: Mutex<HostState>,
    /// Sites committed but not yet converged, keyed by id.
    pending: Mutex<HashMap<u32, Instant>>,
    unreadable: Mutex<HashSet<String>>,
    convergence: Duration,
    never_converges: AtomicBool,
    commits: AtomicU64,
    renames: AtomicU64,
    /// Set when this host models a missing/unsupported control plane.
    unsupported_reason: Option<String>,
}

impl MemoryHost {
    /// A host that converges instantly after commit.
    pub fn new() -> Self {
        Self::with_convergence(Duration::ZERO)
    }

    /// A host whose freshly committed sites report `NotReady` until
    /// `convergence` has elapsed.
    pub fn with_convergence(convergence: Duration) -> Self {
        Self {
            state: Mutex::new(HostState::default()),
            pending: Mutex::new(HashMap::new()),
            unreadable: Mutex::new(HashSet::new()),
            convergence,
            never_converges: AtomicBool::new(false),
            commits: AtomicU64::new(0),
            renames: AtomicU64::new(0),
            unsupported_reason: None,
        }
    }

    /// A host that fails the structural precondition check on `open`.
    pub fn unsupported(reason: &str) -> Self {
        let mut host = Self::new();
        host.unsupported_reason = Some(reason.to_string());
        host
    }

    fn lock(&self) -> Result<MutexGuard<'_, HostState>> {
        self.state
            .lock()
            .map_err(|_| HostError::Other("memory host state lock poisoned".to_string()))
    }

    // Seeding and inspection, used by tests across the workspace.

    /// Register an application pool.
    pub fn seed_pool(&self, name: &str) {
        let mut state = self.state.lock().expect("memory host state lock poisoned");
        if !state.pools.iter().any(|p| p == name) {
            state.pools.push(name.to_string());
        }
    }

    /// Install a site directly into committed state, assigning the lowest
    /// free id when `record.id` is 0. Returns the effective id.
    pub fn seed_site(&self, mut record: SiteRecord) -> u32 {
        let mut state = self.state.lock().expect("memory host state lock poisoned");
        if record.id == 0 {
            record.id = lowest_free_id(&state.sites);
        }
        if let Some(primary) = record.applications.first() {
            let pool = primary.pool.clone();
            if !pool.is_empty() && !state.pools.iter().any(|p| *p == pool) {
                state.pools.push(pool);
            }
        }
        let id = record.id;
        state.sites.push(record);
        id
    }

    /// Make `start_site` fail with `PathInaccessible` for any site whose
    /// primary application lives under `path`.
    pub fn mark_path_unreadable(&self, path: &str) {
        self.unreadable
            .lock()
            .expect("memory host path lock poisoned")
            .insert(path.to_string());
    }

    /// When set, committed sites never leave the `NotReady` window.
    pub fn set_never_converges(&self, value: bool) {
        self.never_converges.store(value, Ordering::Relaxed);
    }

    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Number of `set_site_name` calls staged against this host, committed
    /// or not.
    pub fn rename_count(&self) -> u64 {
        self.renames.load(Ordering::Relaxed)
    }

    pub fn site_count(&self) -> usize {
        self.state
            .lock()
            .expect("memory host state lock poisoned")
            .sites
            .len()
    }

    pub fn site_named(&self, name: &str) -> Option<SiteRecord> {
        self.state
            .lock()
            .expect("memory host state lock poisoned")
            .sites
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    pub fn pool_exists(&self, name: &str) -> bool {
        self.state
            .lock()
            .expect("memory host state lock poisoned")
            .pools
            .iter()
            .any(|p| p == name)
    }

    pub fn recycle_count(&self, pool: &str) -> u32 {
        self.state
            .lock()
            .expect("memory host state lock poisoned")
            .recycles
            .get(pool)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlPlane for MemoryHost {
    fn open(&self) -> Result<Box<dyn HostSession + '_>> {
        if let Some(reason) = &self.unsupported_reason {
            return Err(HostError::Unsupported(reason.clone()));
        }
        let view = self.lock()?.clone();
        Ok(Box::new(MemorySession {
            host: self,
            view,
            created: Vec::new(),
        }))
    }
}

fn lowest_free_id(sites: &[SiteRecord]) -> u32 {
    let mut id = 1;
    while sites.iter().any(|s| s.id == id) {
        id += 1;
    }
    id
}

/// A session over [`MemoryHost`]: private view plus the ids created in it.
struct MemorySession<'a> {
    host: &'a MemoryHost,
    view: HostState,
    created: Vec<u32>,
}

impl MemorySession<'_> {
    fn view_site_mut(&mut self, id: u32) -> Result<&mut SiteRecord> {
        self.view
            .sites
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(HostError::SiteGone(id))
    }
}

impl HostSession for MemorySession<'_> {
    fn sites(&self) -> Result<Vec<SiteRecord>> {
        Ok(self.view.sites.clone())
    }

    fn site_by_id(&self, id: u32) -> Result<Option<SiteRecord>> {
        Ok(self.view.sites.iter().find(|s| s.id == id).cloned())
    }

    fn site_by_name(&self, name: &str) -> Result<Option<SiteRecord>> {
        Ok(self.view.sites.iter().find(|s| s.name == name).cloned())
    }

    fn site_state(&self, id: u32) -> Result<String> {
        let pending = self
            .host
            .pending
            .lock()
            .map_err(|_| HostError::Other("memory host pending lock poisoned".to_string()))?;
        if let Some(committed_at) = pending.get(&id) {
            let converged = !self.host.never_converges.load(Ordering::Relaxed)
                && committed_at.elapsed() >= self.host.convergence;
            if !converged {
                return Err(HostError::NotReady);
            }
        }
        drop(pending);

        let state = self.host.lock()?;
        state
            .sites
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.state.clone())
            .ok_or(HostError::SiteGone(id))
    }

    fn pool_names(&self) -> Result<Vec<String>> {
        Ok(self.view.pools.clone())
    }

    fn pool_state(&self, name: &str) -> Result<String> {
        if self.view.pools.iter().any(|p| p == name) {
            Ok("Started".to_string())
        } else {
            Err(HostError::PoolGone(name.to_string()))
        }
    }

    fn create_site(
        &mut self,
        name: &str,
        protocol: &str,
        binding_info: &str,
        physical_path: &str,
    ) -> Result<u32> {
        let id = lowest_free_id(&self.view.sites);
        self.view.sites.push(SiteRecord {
            id,
            name: name.to_string(),
            state: "Started".to_string(),
            log_directory: String::new(),
            bindings: vec![BindingRecord::new(protocol, binding_info)],
            applications: vec![ApplicationRecord::new("/", physical_path, "")],
        });
        self.created.push(id);
        Ok(id)
    }

    fn set_site_name(&mut self, id: u32, name: &str) -> Result<()> {
        let site = self.view_site_mut(id)?;
        site.name = name.to_string();
        self.host.renames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_physical_path(&mut self, id: u32, path: &str) -> Result<()> {
        let site = self.view_site_mut(id)?;
        match site.applications.first_mut() {
            Some(primary) => {
                primary.physical_path = path.to_string();
                Ok(())
            }
            None => Err(HostError::Other(format!(
                "site {id} has no primary application"
            ))),
        }
    }

    fn set_site_pool(&mut self, id: u32, pool: &str) -> Result<()> {
        let site = self.view_site_mut(id)?;
        match site.applications.first_mut() {
            Some(primary) => primary.pool = pool.to_string(),
            None => {
                return Err(HostError::Other(format!(
                    "site {id} has no primary application"
                )));
            }
        }
        // The host registers unknown pools implicitly on first reference.
        if !self.view.pools.iter().any(|p| p == pool) {
            self.view.pools.push(pool.to_string());
        }
        Ok(())
    }

    fn clear_bindings(&mut self, id: u32) -> Result<()> {
        self.view_site_mut(id)?.bindings.clear();
        Ok(())
    }

    fn add_binding(&mut self, id: u32, info: &str, protocol: &str) -> Result<()> {
        self.view_site_mut(id)?
            .bindings
            .push(BindingRecord::new(protocol, info));
        Ok(())
    }

    fn add_binding_with_certificate(&mut self, id: u32, info: &str, hash: &[u8]) -> Result<()> {
        self.view_site_mut(id)?
            .bindings
            .push(BindingRecord::with_certificate("https", info, hash.to_vec()));
        Ok(())
    }

    fn add_application(&mut self, id: u32, path: &str, disk_path: &str, pool: &str) -> Result<()> {
        let site = self.view_site_mut(id)?;
        if site.applications.iter().any(|a| a.path == path) {
            return Err(HostError::Other(format!(
                "application '{path}' already exists under site {id}"
            )));
        }
        site.applications
            .push(ApplicationRecord::new(path, disk_path, pool));
        Ok(())
    }

    fn update_application(
        &mut self,
        id: u32,
        path: &str,
        disk_path: &str,
        pool: &str,
    ) -> Result<()> {
        let site = self.view_site_mut(id)?;
        match site.applications.iter_mut().find(|a| a.path == path) {
            Some(app) => {
                app.physical_path = disk_path.to_string();
                app.pool = pool.to_string();
                Ok(())
            }
            None => Err(HostError::Other(format!(
                "no application '{path}' under site {id}"
            ))),
        }
    }

    fn delete_application(&mut self, id: u32, path: &str) -> Result<()> {
        let site = self.view_site_mut(id)?;
        let before = site.applications.len();
        site.applications.retain(|a| a.path != path);
        if site.applications.len() == before {
            return Err(HostError::Other(format!(
                "no application '{path}' under site {id}"
            )));
        }
        Ok(())
    }

    fn create_pool(&mut self, name: &str) -> Result<()> {
        if self.view.pools.iter().any(|p| p == name) {
            return Err(HostError::Other(format!(
                "application pool '{name}' already exists"
            )));
        }
        self.view.pools.push(name.to_string());
        Ok(())
    }

    fn delete_pool(&mut self, name: &str) -> Result<()> {
        let before = self.view.pools.len();
        self.view.pools.retain(|p| p != name);
        if self.view.pools.len() == before {
            return Err(HostError::PoolGone(name.to_string()));
        }
        Ok(())
    }

    fn delete_site(&mut self, id: u32) -> Result<()> {
        let before = self.view.sites.len();
        self.view.sites.retain(|s| s.id != id);
        if self.view.sites.len() == before {
            return Err(HostError::SiteGone(id));
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mut state = self.host.lock()?;
        *state = self.view.clone();
        drop(state);

        let mut pending = self
            .host
            .pending
            .lock()
            .map_err(|_| HostError::Other("memory host pending lock poisoned".to_string()))?;
        let now = Instant::now();
        for id in self.created.drain(..) {
            pending.insert(id, now);
        }
        drop(pending);

        let commits = self.host.commits.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(commits, "memory host applied staged mutations");
        Ok(())
    }

    fn start_site(&mut self, id: u32) -> Result<()> {
        let unreadable = self
            .host
            .unreadable
            .lock()
            .map_err(|_| HostError::Other("memory host path lock poisoned".to_string()))?
            .clone();
        let mut state = self.host.lock()?;

        let idx = state
            .sites
            .iter()
            .position(|s| s.id == id)
            .ok_or(HostError::SiteGone(id))?;
        if let Some(primary) = state.sites[idx].applications.first() {
            if unreadable.contains(&primary.physical_path) {
                return Err(HostError::PathInaccessible);
            }
        }

        let infos: Vec<String> = state.sites[idx]
            .bindings
            .iter()
            .map(|b| b.info.clone())
            .collect();
        let clash = state.sites.iter().any(|other| {
            other.id != id
                && other.state == "Started"
                && other.bindings.iter().any(|b| infos.contains(&b.info))
        });
        if clash {
            return Err(HostError::BindingInUse);
        }

        state.sites[idx].state = "Started".to_string();
        drop(state);
        if let Ok(site) = self.view_site_mut(id) {
            site.state = "Started".to_string();
        }
        Ok(())
    }

    fn stop_site(&mut self, id: u32) -> Result<()> {
        let mut state = self.host.lock()?;
        let site = state
            .sites
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(HostError::SiteGone(id))?;
        site.state = "Stopped".to_string();
        drop(state);
        if let Ok(site) = self.view_site_mut(id) {
            site.state = "Stopped".to_string();
        }
        Ok(())
    }

    fn recycle_pool(&mut self, name: &str) -> Result<()> {
        let mut state = self.host.lock()?;
        if !state.pools.iter().any(|p| p == name) {
            return Err(HostError::PoolGone(name.to_string()));
        }
        *state.recycles.entry(name.to_string()).or_insert(0) += 1;
        Ok(())
    }
}

/// In-memory trust store; mutable out-of-band so tests can exercise the
/// "always read fresh" invariant.
#[derive(Default)]
pub struct MemoryTrustStore {
    certs: Mutex<Vec<CertificateRecord>>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, record: CertificateRecord) {
        self.certs
            .lock()
            .expect("trust store lock poisoned")
            .push(record);
    }

    pub fn remove(&self, thumbprint: &str) {
        self.certs
            .lock()
            .expect("trust store lock poisoned")
            .retain(|c| c.thumbprint != thumbprint);
    }
}

impl TrustStore for MemoryTrustStore {
    fn certificates(&self) -> Result<Vec<CertificateRecord>> {
        self.certs
            .lock()
            .map(|certs| certs.clone())
            .map_err(|_| HostError::Other("trust store lock poisoned".to_string()))
    }
}
