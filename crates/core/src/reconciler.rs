//! Site reconciliation workflows
//!
//! Every operation opens a fresh host session, does its work through it and
//! lets the session drop on the way out; no handle outlives an operation and
//! nothing read from the host is cached between calls. The conflict check in
//! `create_site` runs before any mutation, but it is not atomic with the
//! mutation itself: two callers racing on the same binding can both pass the
//! check. External serialization is assumed.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use siteman_host::{ControlPlane, HostError, HostSession, SiteRecord, TrustStore};

use crate::certs::list_certificates;
use crate::conflict::find_conflict;
use crate::error::CoreError;
use crate::model::{Binding, CreateSiteResult, InstanceState, Protocol, Site, SiteStartResult};
use crate::settings::EngineSettings;
use crate::translate::{map_instance_state, site_from_record};
use crate::Result;

/// Orchestrates create/update/delete/start/stop against the host control
/// plane, consulting the conflict detector before mutations and polling for
/// convergence afterwards.
pub struct SiteReconciler {
    plane: Arc<dyn ControlPlane>,
    trust: Arc<dyn TrustStore>,
    settings: EngineSettings,
}

impl SiteReconciler {
    pub fn new(plane: Arc<dyn ControlPlane>, trust: Arc<dyn TrustStore>) -> Self {
        Self::with_settings(plane, trust, EngineSettings::default())
    }

    pub fn with_settings(
        plane: Arc<dyn ControlPlane>,
        trust: Arc<dyn TrustStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            plane,
            trust,
            settings,
        }
    }

    // Read-only projections

    /// All manageable sites on the host.
    ///
    /// `exclude_app_pools` skips the extra round-trip that fetches each
    /// site's pool run state, for callers that only need topology.
    pub fn get_sites(&self, exclude_app_pools: bool) -> Result<Vec<Site>> {
        let session = self.plane.open()?;
        let certificates = list_certificates(self.trust.as_ref())?;

        let mut sites = Vec::new();
        for record in session.sites()? {
            let pool_state = if exclude_app_pools {
                None
            } else {
                pool_state_of(session.as_ref(), &record)?
            };
            if let Some(site) = site_from_record(&record, pool_state, &certificates) {
                sites.push(site);
            }
        }
        Ok(sites)
    }

    pub fn get_site_by_id(&self, id: u32) -> Result<Option<Site>> {
        let session = self.plane.open()?;
        let certificates = list_certificates(self.trust.as_ref())?;
        match session.site_by_id(id)? {
            Some(record) => {
                let pool_state = pool_state_of(session.as_ref(), &record)?;
                Ok(site_from_record(&record, pool_state, &certificates))
            }
            None => Ok(None),
        }
    }

    pub fn get_site_by_name(&self, name: &str) -> Result<Option<Site>> {
        let session = self.plane.open()?;
        let certificates = list_certificates(self.trust.as_ref())?;
        match session.site_by_name(name)? {
            Some(record) => {
                let pool_state = pool_state_of(session.as_ref(), &record)?;
                Ok(site_from_record(&record, pool_state, &certificates))
            }
            None => Ok(None),
        }
    }

    /// Names of every application pool on the host, sorted.
    pub fn application_pools(&self) -> Result<Vec<String>> {
        let session = self.plane.open()?;
        let mut pools = session.pool_names()?;
        pools.sort();
        Ok(pools)
    }

    /// Whether a single binding would collide with anything on the host,
    /// excluding `exclude_site_id` (0 = exclude none).
    pub fn is_binding_in_use(&self, binding: &Binding, exclude_site_id: u32) -> Result<bool> {
        let session = self.plane.open()?;
        let proposed = vec![binding.to_host_info()];
        Ok(find_conflict(session.as_ref(), exclude_site_id, &proposed)?.is_some())
    }

    // Mutations

    /// Create `site` on the host.
    ///
    /// The conflict check runs before any mutation; a conflicting binding
    /// set returns [`CreateSiteResult::BindingAlreadyInUse`] with the host
    /// untouched. After commit the host is polled until the new site reports
    /// a settled run state; if the bound expires the partially created site
    /// is left in place and [`CreateSiteResult::Failed`] is returned.
    pub fn create_site(&self, site: &Site) -> Result<CreateSiteResult> {
        let infos: Vec<String> = site.bindings.iter().map(Binding::to_host_info).collect();
        let first = infos.first().ok_or(CoreError::EmptyBindingSet)?.clone();

        let mut session = self.plane.open()?;

        if let Some(conflict) = find_conflict(session.as_ref(), 0, &infos)? {
            debug!(site = %site.name, %conflict, "binding already in use, nothing mutated");
            return Ok(CreateSiteResult::BindingAlreadyInUse);
        }

        // Site creation takes exactly one initial binding; the full set is
        // re-added right after.
        let id = session.create_site(&site.name, "http", &first, &site.site_path)?;
        session.clear_bindings(id)?;
        for info in &infos {
            // All bindings go in as plain http here, https ones included;
            // certificate association for created sites is an open question
            // tracked in DESIGN.md.
            session.add_binding(id, info, "http")?;
        }

        let pool = if site.application_pool.trim().is_empty() {
            let pool = next_free_pool_name(&site.name, &session.pool_names()?);
            session.create_pool(&pool)?;
            pool
        } else {
            site.application_pool.clone()
        };
        session.set_site_pool(id, &pool)?;

        session.commit()?;

        let deadline = Instant::now() + self.settings.create_timeout();
        loop {
            match session.site_state(id) {
                Ok(raw) => {
                    if map_instance_state(&raw).is_settled() {
                        info!(site = %site.name, id, pool = %pool, "site created");
                        return Ok(CreateSiteResult::Success { id });
                    }
                }
                // Transient query failures count as "not ready yet".
                Err(HostError::NotReady) => {}
                Err(err) => return Err(err.into()),
            }
            if Instant::now() >= deadline {
                warn!(site = %site.name, id, "site never settled within the poll bound");
                return Ok(CreateSiteResult::Failed);
            }
            thread::sleep(self.settings.poll_interval());
        }
    }

    /// Converge the host site with id `site.id` toward `site`.
    ///
    /// Physical path and pool are overwritten unconditionally; the name only
    /// when it actually changed, because the host mishandles a no-op rename
    /// as a delete-and-insert and then trips over its own name conflict.
    /// Bindings are replaced wholesale; secondary applications are
    /// set-reconciled (create missing, update existing, delete extras).
    pub fn update_site(&self, site: &Site) -> Result<()> {
        let mut session = self.plane.open()?;
        let record = session
            .site_by_id(site.id)?
            .ok_or_else(|| CoreError::SiteNotFound {
                site: site.name.clone(),
            })?;

        session.set_physical_path(site.id, &site.site_path)?;
        if record.name != site.name {
            session.set_site_name(site.id, &site.name)?;
        }
        session.set_site_pool(site.id, &site.application_pool)?;

        session.clear_bindings(site.id)?;
        let certificates = list_certificates(self.trust.as_ref())?;
        for binding in &site.bindings {
            let info = binding.to_host_info();
            match binding.protocol {
                Protocol::Https => {
                    let thumbprint = binding.certificate_thumbprint.as_deref().unwrap_or("");
                    let certificate = certificates
                        .iter()
                        .find(|c| c.thumbprint == thumbprint)
                        .ok_or_else(|| CoreError::CertificateNotFound {
                            thumbprint: thumbprint.to_string(),
                        })?;
                    session.add_binding_with_certificate(site.id, &info, &certificate.hash)?;
                }
                Protocol::Http => {
                    session.add_binding(site.id, &info, binding.protocol.as_str())?;
                }
            }
        }

        // Set-reconcile secondary applications against the pre-mutation
        // record; paths are unique within a site.
        let mut desired_paths = Vec::with_capacity(site.applications.len());
        for app in &site.applications {
            let exists = record
                .applications
                .iter()
                .skip(1)
                .any(|a| a.path == app.path);
            if exists {
                session.update_application(
                    site.id,
                    &app.path,
                    &app.disk_path,
                    &app.application_pool,
                )?;
                desired_paths.push(app.path.clone());
            } else {
                let path = normalize_app_path(&app.path);
                session.add_application(site.id, &path, &app.disk_path, &app.application_pool)?;
                desired_paths.push(path);
            }
        }
        for existing in record.applications.iter().skip(1) {
            if !desired_paths.iter().any(|p| *p == existing.path) {
                session.delete_application(site.id, &existing.path)?;
            }
        }

        session.commit()?;
        info!(site = %site.name, id = site.id, "site updated");
        Ok(())
    }

    /// Start a site, mapping the host's structured start failures onto
    /// [`SiteStartResult`] values.
    pub fn start_site(&self, site: &Site) -> Result<SiteStartResult> {
        let mut session = self.plane.open()?;
        if session.site_by_id(site.id)?.is_none() {
            return Err(CoreError::SiteNotFound {
                site: site.name.clone(),
            });
        }
        match session.start_site(site.id) {
            Ok(()) => Ok(SiteStartResult::Started),
            Err(HostError::BindingInUse) => Ok(SiteStartResult::BindingIsAlreadyInUse),
            Err(HostError::PathInaccessible) => Ok(SiteStartResult::CannotAccessSitePath),
            Err(HostError::SiteGone(_)) => Err(CoreError::SiteNotFound {
                site: site.name.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Stop a site. Host failures propagate unmapped.
    pub fn stop_site(&self, site: &Site) -> Result<()> {
        let mut session = self.plane.open()?;
        if session.site_by_id(site.id)?.is_none() {
            return Err(CoreError::SiteNotFound {
                site: site.name.clone(),
            });
        }
        session.stop_site(site.id)?;
        Ok(())
    }

    /// Stop then start, sequentially. A stop failure aborts the restart;
    /// start is only attempted after a clean stop.
    pub fn restart_site(&self, id: u32) -> Result<SiteStartResult> {
        let site = self
            .get_site_by_id(id)?
            .ok_or_else(|| CoreError::SiteNotFound {
                site: format!("site #{id}"),
            })?;
        self.stop_site(&site)?;
        self.start_site(&site)
    }

    /// Recycle the application pool of the site's primary application.
    pub fn recycle_application_pool_by_site(&self, id: u32) -> Result<()> {
        let mut session = self.plane.open()?;
        let record = session
            .site_by_id(id)?
            .ok_or_else(|| CoreError::SiteNotFound {
                site: format!("site #{id}"),
            })?;
        let pool = record
            .primary()
            .map(|p| p.pool.clone())
            .unwrap_or_default();
        session.recycle_pool(&pool)?;
        info!(site = %record.name, %pool, "application pool recycled");
        Ok(())
    }

    /// Delete a site, and its application pool too when no other site's
    /// primary application still references it. Sleeps the configured
    /// settle delay after commit so the host can catch up before the next
    /// operation reads state.
    pub fn delete_site(&self, id: u32) -> Result<()> {
        let mut session = self.plane.open()?;
        let record = session
            .site_by_id(id)?
            .ok_or_else(|| CoreError::SiteNotFound {
                site: format!("site #{id}"),
            })?;
        let pool = record
            .primary()
            .map(|p| p.pool.clone())
            .unwrap_or_default();

        let references = session
            .sites()?
            .iter()
            .filter(|s| s.primary().map(|p| p.pool.as_str()) == Some(pool.as_str()))
            .count();

        session.delete_site(id)?;
        if references == 1 && !pool.is_empty() {
            session.delete_pool(&pool)?;
        }
        session.commit()?;
        drop(session);

        info!(site = %record.name, id, "site deleted");
        thread::sleep(self.settings.delete_settle());
        Ok(())
    }
}

/// Pool run state of the record's primary application, mapped into the
/// domain vocabulary.
fn pool_state_of(session: &dyn HostSession, record: &SiteRecord) -> Result<Option<InstanceState>> {
    match record.primary() {
        Some(primary) if !primary.pool.is_empty() => {
            let raw = session.pool_state(&primary.pool)?;
            Ok(Some(map_instance_state(&raw)))
        }
        _ => Ok(None),
    }
}

/// First-fit auto-generated pool name: `name`, then `name_1`, `name_2`, …
/// until one is free among the existing pool names.
fn next_free_pool_name(site_name: &str, existing: &[String]) -> String {
    let mut candidate = site_name.to_string();
    let mut suffix = 1;
    while existing.iter().any(|name| *name == candidate) {
        candidate = format!("{site_name}_{suffix}");
        suffix += 1;
    }
    candidate
}

fn normalize_app_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_naming_is_first_fit() {
        let existing = vec!["foo".to_string(), "foo_1".to_string()];
        assert_eq!(next_free_pool_name("foo", &existing), "foo_2");
    }

    #[test]
    fn pool_naming_prefers_the_site_name_itself() {
        assert_eq!(next_free_pool_name("bar", &["foo".to_string()]), "bar");
    }

    #[test]
    fn app_paths_gain_leading_slash() {
        assert_eq!(normalize_app_path("api"), "/api");
        assert_eq!(normalize_app_path("/api"), "/api");
    }
}
