//! Certificate resolution against the machine trust store

use siteman_host::TrustStore;

use crate::Result;
use crate::model::Certificate;

/// Enumerate the trust store into display-ready certificates.
///
/// One pass over the store per call; results are never cached because the
/// store can change between calls and a stale hash must not be matched.
/// Naming policy: the friendly name when present and non-blank, otherwise
/// the `CN=` component of the subject, otherwise the blank friendly name.
pub fn list_certificates(store: &dyn TrustStore) -> Result<Vec<Certificate>> {
    let mut certificates = Vec::new();
    for record in store.certificates()? {
        let name = if record.friendly_name.trim().is_empty() {
            common_name(&record.subject).unwrap_or_else(|| record.friendly_name.clone())
        } else {
            record.friendly_name.clone()
        };
        certificates.push(Certificate {
            name,
            hash: record.hash,
            thumbprint: record.thumbprint,
        });
    }
    Ok(certificates)
}

/// Extract the text after `=` in the subject's `CN` component, if any.
fn common_name(subject: &str) -> Option<String> {
    subject
        .split(',')
        .map(str::trim)
        .find(|part| part.starts_with("CN"))
        .and_then(|part| part.split_once('=').map(|(_, value)| value.to_string()))
}
