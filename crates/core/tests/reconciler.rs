//! End-to-end reconciliation workflows against the in-memory host.

use std::sync::Arc;

use siteman_core::{
    Binding, CoreError, CreateSiteResult, EngineSettings, InstanceState, Site, SiteApplication,
    SiteReconciler, SiteStartResult,
};
use siteman_host::{
    ApplicationRecord, BindingRecord, CertificateRecord, MemoryHost, MemoryTrustStore, SiteRecord,
};

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .without_time()
            .try_init();
    });
}

fn fast_settings() -> EngineSettings {
    EngineSettings {
        poll_interval_ms: 5,
        create_timeout_ms: 200,
        delete_settle_ms: 0,
    }
}

fn engine(host: &Arc<MemoryHost>, trust: &Arc<MemoryTrustStore>) -> SiteReconciler {
    SiteReconciler::with_settings(host.clone(), trust.clone(), fast_settings())
}

fn fixture() -> (Arc<MemoryHost>, Arc<MemoryTrustStore>, SiteReconciler) {
    init_tracing();
    let host = Arc::new(MemoryHost::new());
    let trust = Arc::new(MemoryTrustStore::new());
    let reconciler = engine(&host, &trust);
    (host, trust, reconciler)
}

fn desired(name: &str, bindings: Vec<Binding>) -> Site {
    Site {
        id: 0,
        name: name.to_string(),
        site_path: "C:\\web".to_string(),
        application_pool: String::new(),
        site_state: InstanceState::Stopped,
        application_pool_state: None,
        log_file_directory: String::new(),
        bindings,
        applications: Vec::new(),
    }
}

fn seeded(name: &str, pool: &str, bindings: Vec<BindingRecord>) -> SiteRecord {
    SiteRecord {
        id: 0,
        name: name.to_string(),
        state: "Started".to_string(),
        log_directory: String::new(),
        bindings,
        applications: vec![ApplicationRecord::new("/", "C:\\web", pool)],
    }
}

// create

#[test]
fn create_commits_site_with_all_bindings() {
    let (host, _, reconciler) = fixture();
    let site = desired(
        "web",
        vec![
            Binding::http("*", 80, "example.org"),
            Binding::http("*", 80, "www.example.org"),
        ],
    );

    let result = reconciler.create_site(&site).unwrap();
    let id = match result {
        CreateSiteResult::Success { id } => id,
        other => panic!("expected success, got {other:?}"),
    };

    let record = host.site_named("web").unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.bindings.len(), 2);
    assert!(record.bindings.iter().all(|b| b.protocol == "http"));
    assert_eq!(record.primary().unwrap().pool, "web");
    assert!(host.pool_exists("web"));
}

#[test]
fn conflicting_create_mutates_nothing() {
    let (host, _, reconciler) = fixture();
    host.seed_site(seeded(
        "taken",
        "takenpool",
        vec![BindingRecord::new("http", "*:80:example.org")],
    ));

    let result = reconciler
        .create_site(&desired("web", vec![Binding::http("*", 80, "example.org")]))
        .unwrap();

    assert_eq!(result, CreateSiteResult::BindingAlreadyInUse);
    assert_eq!(host.site_count(), 1);
    assert_eq!(host.commit_count(), 0);
}

#[test]
fn https_endpoint_blocks_create_across_hostnames() {
    let (host, _, reconciler) = fixture();
    host.seed_site(seeded(
        "secure",
        "securepool",
        vec![BindingRecord::with_certificate(
            "https",
            "*:443:one.example.org",
            vec![1],
        )],
    ));

    let result = reconciler
        .create_site(&desired(
            "web",
            vec![Binding::http("*", 443, "two.example.org")],
        ))
        .unwrap();

    assert_eq!(result, CreateSiteResult::BindingAlreadyInUse);
}

#[test]
fn auto_pool_name_skips_taken_suffixes() {
    let (host, _, reconciler) = fixture();
    host.seed_pool("web");
    host.seed_pool("web_1");

    reconciler
        .create_site(&desired("web2", vec![Binding::http("*", 81, "")]))
        .unwrap();
    // Different site name, so the bare name is free.
    assert!(host.pool_exists("web2"));

    reconciler
        .create_site(&desired("web", vec![Binding::http("*", 80, "")]))
        .unwrap();
    assert!(host.pool_exists("web_2"));
    assert_eq!(host.site_named("web").unwrap().primary().unwrap().pool, "web_2");
}

#[test]
fn explicit_pool_is_used_verbatim() {
    let (host, _, reconciler) = fixture();
    let mut site = desired("web", vec![Binding::http("*", 80, "")]);
    site.application_pool = "shared-pool".to_string();

    reconciler.create_site(&site).unwrap();
    assert_eq!(
        host.site_named("web").unwrap().primary().unwrap().pool,
        "shared-pool"
    );
}

#[test]
fn create_without_bindings_is_rejected() {
    let (_, _, reconciler) = fixture();
    let err = reconciler.create_site(&desired("web", vec![])).unwrap_err();
    assert!(matches!(err, CoreError::EmptyBindingSet));
}

#[test]
fn create_fails_without_cleanup_when_host_never_settles() {
    let host = Arc::new(MemoryHost::new());
    host.set_never_converges(true);
    let trust = Arc::new(MemoryTrustStore::new());
    let reconciler = engine(&host, &trust);

    let result = reconciler
        .create_site(&desired("web", vec![Binding::http("*", 80, "")]))
        .unwrap();

    assert_eq!(result, CreateSiteResult::Failed);
    // The half-created site stays for the operator to inspect.
    assert!(host.site_named("web").is_some());
}

// update

#[test]
fn update_overwrites_path_and_pool() {
    let (host, _, reconciler) = fixture();
    let id = host.seed_site(seeded(
        "web",
        "oldpool",
        vec![BindingRecord::new("http", "*:80:")],
    ));

    let mut site = reconciler.get_site_by_id(id).unwrap().unwrap();
    site.site_path = "D:\\sites\\web".to_string();
    site.application_pool = "newpool".to_string();
    reconciler.update_site(&site).unwrap();

    let record = host.site_named("web").unwrap();
    let primary = record.primary().unwrap();
    assert_eq!(primary.physical_path, "D:\\sites\\web");
    assert_eq!(primary.pool, "newpool");
}

#[test]
fn update_is_idempotent() {
    let (host, _, reconciler) = fixture();
    let id = host.seed_site(seeded(
        "web",
        "pool",
        vec![BindingRecord::new("http", "*:80:example.org")],
    ));

    let site = reconciler.get_site_by_id(id).unwrap().unwrap();
    reconciler.update_site(&site).unwrap();
    let after_first = reconciler.get_site_by_id(id).unwrap().unwrap();
    reconciler.update_site(&after_first).unwrap();
    let after_second = reconciler.get_site_by_id(id).unwrap().unwrap();

    assert_eq!(after_first, after_second);
    // An unchanged name never reaches the host as a rename.
    assert_eq!(host.rename_count(), 0);
}

#[test]
fn update_renames_only_when_name_changed() {
    let (host, _, reconciler) = fixture();
    let id = host.seed_site(seeded(
        "old-name",
        "pool",
        vec![BindingRecord::new("http", "*:80:")],
    ));

    let mut site = reconciler.get_site_by_id(id).unwrap().unwrap();
    site.name = "new-name".to_string();
    reconciler.update_site(&site).unwrap();

    assert!(host.site_named("old-name").is_none());
    assert_eq!(host.site_named("new-name").unwrap().id, id);
    assert_eq!(host.rename_count(), 1);
}

#[test]
fn update_associates_certificate_by_thumbprint() {
    let (host, trust, reconciler) = fixture();
    let cert = CertificateRecord::new("web-cert", "CN=example.org", vec![0xAB, 0xCD]);
    let thumbprint = cert.thumbprint.clone();
    trust.install(cert);

    let id = host.seed_site(seeded(
        "web",
        "pool",
        vec![BindingRecord::new("http", "*:80:example.org")],
    ));

    let mut site = reconciler.get_site_by_id(id).unwrap().unwrap();
    site.bindings = vec![Binding::https("*", 443, "example.org", &thumbprint)];
    reconciler.update_site(&site).unwrap();

    let record = host.site_named("web").unwrap();
    assert_eq!(record.bindings.len(), 1);
    assert_eq!(record.bindings[0].protocol, "https");
    assert_eq!(
        record.bindings[0].certificate_hash.as_deref(),
        Some(&[0xAB, 0xCD][..])
    );
}

#[test]
fn update_with_unknown_thumbprint_fails() {
    let (host, _, reconciler) = fixture();
    let id = host.seed_site(seeded(
        "web",
        "pool",
        vec![BindingRecord::new("http", "*:80:")],
    ));

    let mut site = reconciler.get_site_by_id(id).unwrap().unwrap();
    site.bindings = vec![Binding::https("*", 443, "", "DEADBEEF")];
    let err = reconciler.update_site(&site).unwrap_err();
    assert!(matches!(err, CoreError::CertificateNotFound { .. }));
}

#[test]
fn update_reconciles_secondary_application_set() {
    let (host, _, reconciler) = fixture();
    let mut record = seeded("web", "pool", vec![BindingRecord::new("http", "*:80:")]);
    record
        .applications
        .push(ApplicationRecord::new("/a", "C:\\a", "pool"));
    record
        .applications
        .push(ApplicationRecord::new("/b", "C:\\b", "pool"));
    let id = host.seed_site(record);

    let mut site = reconciler.get_site_by_id(id).unwrap().unwrap();
    site.applications = vec![
        SiteApplication::new("/a", "C:\\a2", "pool"),
        // No leading slash; gains one on the way in.
        SiteApplication::new("c", "C:\\c", "pool"),
    ];
    reconciler.update_site(&site).unwrap();

    let apps = host.site_named("web").unwrap().applications;
    let paths: Vec<&str> = apps.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(paths, vec!["/", "/a", "/c"]);
    assert_eq!(apps[1].physical_path, "C:\\a2");
}

#[test]
fn update_of_missing_site_fails() {
    let (_, _, reconciler) = fixture();
    let mut site = desired("ghost", vec![Binding::http("*", 80, "")]);
    site.id = 42;
    assert!(matches!(
        reconciler.update_site(&site).unwrap_err(),
        CoreError::SiteNotFound { .. }
    ));
}

// start / stop / restart

#[test]
fn start_maps_binding_clash() {
    let (host, _, reconciler) = fixture();
    host.seed_site(seeded(
        "running",
        "pool-a",
        vec![BindingRecord::new("http", "*:80:")],
    ));
    let mut stopped = seeded("blocked", "pool-b", vec![BindingRecord::new("http", "*:80:")]);
    stopped.state = "Stopped".to_string();
    let id = host.seed_site(stopped);

    let site = reconciler.get_site_by_id(id).unwrap().unwrap();
    assert_eq!(
        reconciler.start_site(&site).unwrap(),
        SiteStartResult::BindingIsAlreadyInUse
    );
}

#[test]
fn start_maps_unreadable_path() {
    let (host, _, reconciler) = fixture();
    let id = host.seed_site(seeded(
        "web",
        "pool",
        vec![BindingRecord::new("http", "*:80:")],
    ));
    host.mark_path_unreadable("C:\\web");

    let site = reconciler.get_site_by_id(id).unwrap().unwrap();
    assert_eq!(
        reconciler.start_site(&site).unwrap(),
        SiteStartResult::CannotAccessSitePath
    );
}

#[test]
fn stop_then_start_round_trips() {
    let (host, _, reconciler) = fixture();
    let id = host.seed_site(seeded(
        "web",
        "pool",
        vec![BindingRecord::new("http", "*:80:")],
    ));

    let site = reconciler.get_site_by_id(id).unwrap().unwrap();
    reconciler.stop_site(&site).unwrap();
    assert_eq!(host.site_named("web").unwrap().state, "Stopped");

    assert_eq!(
        reconciler.start_site(&site).unwrap(),
        SiteStartResult::Started
    );
    assert_eq!(host.site_named("web").unwrap().state, "Started");
}

#[test]
fn restart_ends_started() {
    let (host, _, reconciler) = fixture();
    let id = host.seed_site(seeded(
        "web",
        "pool",
        vec![BindingRecord::new("http", "*:80:")],
    ));

    assert_eq!(
        reconciler.restart_site(id).unwrap(),
        SiteStartResult::Started
    );
    assert_eq!(host.site_named("web").unwrap().state, "Started");
}

#[test]
fn restart_stops_before_attempting_start() {
    let (host, _, reconciler) = fixture();
    let id = host.seed_site(seeded(
        "web",
        "pool",
        vec![BindingRecord::new("http", "*:80:")],
    ));
    host.mark_path_unreadable("C:\\web");

    let result = reconciler.restart_site(id).unwrap();

    // The stop landed; the start attempt then failed on the path.
    assert_eq!(result, SiteStartResult::CannotAccessSitePath);
    assert_eq!(host.site_named("web").unwrap().state, "Stopped");
}

#[test]
fn restart_of_missing_site_fails() {
    let (_, _, reconciler) = fixture();
    assert!(matches!(
        reconciler.restart_site(42).unwrap_err(),
        CoreError::SiteNotFound { .. }
    ));
}

// delete / recycle

#[test]
fn delete_removes_exclusively_owned_pool() {
    let (host, _, reconciler) = fixture();
    let id = host.seed_site(seeded(
        "web",
        "webpool",
        vec![BindingRecord::new("http", "*:80:")],
    ));

    reconciler.delete_site(id).unwrap();
    assert_eq!(host.site_count(), 0);
    assert!(!host.pool_exists("webpool"));
}

#[test]
fn delete_keeps_shared_pool() {
    let (host, _, reconciler) = fixture();
    let id = host.seed_site(seeded(
        "web",
        "shared",
        vec![BindingRecord::new("http", "*:80:")],
    ));
    host.seed_site(seeded(
        "other",
        "shared",
        vec![BindingRecord::new("http", "*:81:")],
    ));

    reconciler.delete_site(id).unwrap();
    assert_eq!(host.site_count(), 1);
    assert!(host.pool_exists("shared"));
}

#[test]
fn recycle_targets_primary_application_pool() {
    let (host, _, reconciler) = fixture();
    let id = host.seed_site(seeded(
        "web",
        "webpool",
        vec![BindingRecord::new("http", "*:80:")],
    ));

    reconciler.recycle_application_pool_by_site(id).unwrap();
    assert_eq!(host.recycle_count("webpool"), 1);
}

// reads

#[test]
fn get_sites_filters_ftp_only_sites() {
    let (host, _, reconciler) = fixture();
    host.seed_site(seeded(
        "web",
        "pool",
        vec![BindingRecord::new("http", "*:80:")],
    ));
    host.seed_site(seeded(
        "files",
        "ftppool",
        vec![BindingRecord::new("ftp", "*:21:")],
    ));

    let sites = reconciler.get_sites(false).unwrap();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].name, "web");
    assert_eq!(sites[0].application_pool_state, Some(InstanceState::Started));
}

#[test]
fn get_sites_can_skip_pool_state() {
    let (host, _, reconciler) = fixture();
    host.seed_site(seeded(
        "web",
        "pool",
        vec![BindingRecord::new("http", "*:80:")],
    ));

    let sites = reconciler.get_sites(true).unwrap();
    assert_eq!(sites[0].application_pool_state, None);
}

#[test]
fn application_pools_are_sorted() {
    let (host, _, reconciler) = fixture();
    host.seed_pool("zeta");
    host.seed_pool("alpha");
    assert_eq!(reconciler.application_pools().unwrap(), vec!["alpha", "zeta"]);
}

#[test]
fn unsupported_host_surfaces_structural_error() {
    let host = Arc::new(MemoryHost::unsupported("control plane not installed"));
    let trust = Arc::new(MemoryTrustStore::new());
    let reconciler = engine(&host, &trust);

    assert!(matches!(
        reconciler.get_sites(false).unwrap_err(),
        CoreError::Host(_)
    ));
}

#[test]
fn is_binding_in_use_respects_exclusion() {
    let (host, _, reconciler) = fixture();
    let id = host.seed_site(seeded(
        "web",
        "pool",
        vec![BindingRecord::new("http", "*:80:example.org")],
    ));

    let binding = Binding::http("*", 80, "example.org");
    assert!(reconciler.is_binding_in_use(&binding, 0).unwrap());
    assert!(!reconciler.is_binding_in_use(&binding, id).unwrap());
}
