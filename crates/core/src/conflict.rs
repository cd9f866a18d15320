//! Binding conflict detection

use siteman_host::{BindingRecord, HostSession};

use crate::Result;

/// Find the first proposed binding that collides with anything already
/// configured on the host, excluding the site `exclude_site_id` (pass 0 to
/// exclude nothing; no real site ever has that id).
///
/// Two rules, checked over an exhaustive scan of every binding on every
/// other site:
///
/// 1. An exact `ip:port:hostname` match conflicts regardless of protocol.
/// 2. The host permits only one TLS certificate per `ip:port` endpoint, so
///    any proposed info sharing an endpoint with an existing https binding
///    conflicts even when the hostnames differ; SNI does not lift the limit.
///
/// Returns the first colliding info in host enumeration order, or `None`.
pub fn find_conflict(
    session: &dyn HostSession,
    exclude_site_id: u32,
    proposed: &[String],
) -> Result<Option<String>> {
    let mut https_endpoints: Vec<String> = Vec::new();

    for site in session.sites()? {
        if site.id == exclude_site_id {
            continue;
        }
        for binding in &site.bindings {
            if binding.protocol == "https" {
                https_endpoints.push(BindingRecord::endpoint(&binding.info).to_string());
            }
            if proposed.iter().any(|info| *info == binding.info) {
                return Ok(Some(binding.info.clone()));
            }
        }
    }

    for info in proposed {
        if https_endpoints
            .iter()
            .any(|endpoint| endpoint == BindingRecord::endpoint(info))
        {
            return Ok(Some(info.clone()));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use siteman_host::{ApplicationRecord, ControlPlane, MemoryHost, SiteRecord};

    use super::*;

    fn seed(host: &MemoryHost, name: &str, bindings: Vec<BindingRecord>) -> u32 {
        host.seed_site(SiteRecord {
            id: 0,
            name: name.to_string(),
            state: "Started".to_string(),
            log_directory: String::new(),
            bindings,
            applications: vec![ApplicationRecord::new("/", "C:\\web", "pool")],
        })
    }

    fn specs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_tuple_conflicts_regardless_of_protocol() {
        let host = MemoryHost::new();
        seed(&host, "a", vec![BindingRecord::new("http", "*:80:example.org")]);

        let session = host.open().unwrap();
        let conflict =
            find_conflict(session.as_ref(), 0, &specs(&["*:80:example.org"])).unwrap();
        assert_eq!(conflict.as_deref(), Some("*:80:example.org"));
    }

    #[test]
    fn https_endpoint_conflicts_across_hostnames() {
        let host = MemoryHost::new();
        seed(
            &host,
            "a",
            vec![BindingRecord::with_certificate(
                "https",
                "*:443:one.example.org",
                vec![1],
            )],
        );

        let session = host.open().unwrap();
        let conflict =
            find_conflict(session.as_ref(), 0, &specs(&["*:443:two.example.org"])).unwrap();
        assert_eq!(conflict.as_deref(), Some("*:443:two.example.org"));
    }

    #[test]
    fn http_endpoint_with_different_hostname_is_fine() {
        let host = MemoryHost::new();
        seed(&host, "a", vec![BindingRecord::new("http", "*:80:one.example.org")]);

        let session = host.open().unwrap();
        let conflict =
            find_conflict(session.as_ref(), 0, &specs(&["*:80:two.example.org"])).unwrap();
        assert!(conflict.is_none());
    }

    #[test]
    fn excluded_site_does_not_conflict_with_itself() {
        let host = MemoryHost::new();
        let id = seed(&host, "a", vec![BindingRecord::new("http", "*:80:example.org")]);

        let session = host.open().unwrap();
        let conflict =
            find_conflict(session.as_ref(), id, &specs(&["*:80:example.org"])).unwrap();
        assert!(conflict.is_none());
    }

    #[test]
    fn scan_is_exhaustive_across_sites() {
        let host = MemoryHost::new();
        seed(&host, "a", vec![BindingRecord::new("http", "*:80:a")]);
        seed(&host, "b", vec![BindingRecord::new("http", "*:80:b")]);
        seed(&host, "c", vec![BindingRecord::new("http", "*:80:c")]);

        let session = host.open().unwrap();
        let conflict = find_conflict(session.as_ref(), 0, &specs(&["*:80:c"])).unwrap();
        assert_eq!(conflict.as_deref(), Some("*:80:c"));
    }

    #[test]
    fn empty_host_never_conflicts() {
        let host = MemoryHost::new();
        let session = host.open().unwrap();
        let conflict = find_conflict(session.as_ref(), 0, &specs(&["*:80:web"])).unwrap();
        assert!(conflict.is_none());
    }
}
