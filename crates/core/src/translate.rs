//! Host record to domain model translation

use siteman_host::{BindingRecord, SiteRecord};

use crate::model::{Binding, Certificate, InstanceState, Protocol, Site, SiteApplication};

/// Map the host's run-state vocabulary onto [`InstanceState`].
///
/// The mapping is total over everything the host is documented to emit; an
/// unrecognized value means the host API has drifted underneath us, which is
/// a programmer error, not something to recover from.
///
/// # Panics
///
/// Panics on a state string outside the host vocabulary.
pub fn map_instance_state(raw: &str) -> InstanceState {
    match raw {
        "Starting" => InstanceState::Starting,
        "Started" => InstanceState::Started,
        "Stopping" => InstanceState::Stopping,
        "Stopped" => InstanceState::Stopped,
        "Unknown" => InstanceState::Unknown,
        other => panic!("unmapped host object state '{other}'"),
    }
}

/// Translate a host site record into the domain model.
///
/// Returns `None` when the record has no primary application, or when its
/// bindings are exclusively on unsupported transports (ftp-family sites are
/// not ours to manage). Within a translated site, bindings on protocols other
/// than http/https are silently dropped, as is any https binding whose
/// certificate hash has no match in `certificates`.
pub fn site_from_record(
    record: &SiteRecord,
    pool_state: Option<InstanceState>,
    certificates: &[Certificate],
) -> Option<Site> {
    let primary = record.primary()?;

    let unsupported_only = !record.bindings.is_empty()
        && record
            .bindings
            .iter()
            .all(|b| matches!(b.protocol.as_str(), "ftp" | "ftps"));
    if unsupported_only {
        return None;
    }

    let bindings = record
        .bindings
        .iter()
        .filter_map(|b| binding_from_record(b, certificates))
        .collect();

    let applications = record
        .applications
        .iter()
        .skip(1)
        .map(|a| SiteApplication::new(&a.path, &a.physical_path, &a.pool))
        .collect();

    Some(Site {
        id: record.id,
        name: record.name.clone(),
        site_path: primary.physical_path.clone(),
        application_pool: primary.pool.clone(),
        site_state: map_instance_state(&record.state),
        application_pool_state: pool_state,
        log_file_directory: record.log_directory.clone(),
        bindings,
        applications,
    })
}

fn binding_from_record(record: &BindingRecord, certificates: &[Certificate]) -> Option<Binding> {
    let protocol = match record.protocol.as_str() {
        "http" => Protocol::Http,
        "https" => Protocol::Https,
        _ => return None,
    };

    let (ip_address, port, hostname) = split_info(&record.info)?;

    let (certificate_name, certificate_thumbprint) = if protocol == Protocol::Https {
        let hash = record.certificate_hash.as_ref()?;
        let certificate = certificates.iter().find(|c| c.hash == *hash)?;
        (
            Some(certificate.name.clone()),
            Some(certificate.thumbprint.clone()),
        )
    } else {
        (None, None)
    };

    let ip_address = if ip_address == "0.0.0.0" {
        "*".to_string()
    } else {
        ip_address
    };

    Some(Binding {
        protocol,
        hostname,
        ip_address,
        port,
        certificate_name,
        certificate_thumbprint,
    })
}

/// Split `ip:port:hostname` host notation; hostname may be empty.
fn split_info(info: &str) -> Option<(String, u16, String)> {
    let (endpoint, hostname) = info.rsplit_once(':')?;
    let (ip, port) = endpoint.rsplit_once(':')?;
    let port = port.parse().ok()?;
    Some((ip.to_string(), port, hostname.to_string()))
}
