//! Host-native record types
//!
//! These mirror the control plane's own vocabulary: protocols and run states
//! are plain strings, binding specs use the host's `ip:port:hostname`
//! notation, and the primary application of a site is `applications[0]`.
//! Translation into the engine's domain model happens in siteman-core.

use serde::{Deserialize, Serialize};

/// A site as the host reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    /// Host-assigned identifier, never chosen by a caller.
    pub id: u32,
    pub name: String,
    /// Run state in the host's vocabulary ("Started", "Stopped", ...).
    pub state: String,
    pub log_directory: String,
    pub bindings: Vec<BindingRecord>,
    /// Applications under the site; index 0 is the primary application.
    pub applications: Vec<ApplicationRecord>,
}

impl SiteRecord {
    /// The primary application, if the record has one at all.
    pub fn primary(&self) -> Option<&ApplicationRecord> {
        self.applications.first()
    }
}

/// A single binding in host notation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingRecord {
    /// Protocol string as the host stores it ("http", "https", "ftp", ...).
    pub protocol: String,
    /// Binding information in `ip:port:hostname` form.
    pub info: String,
    /// Raw certificate hash for https bindings, when one is associated.
    pub certificate_hash: Option<Vec<u8>>,
}

impl BindingRecord {
    pub fn new(protocol: &str, info: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            info: info.to_string(),
            certificate_hash: None,
        }
    }

    pub fn with_certificate(protocol: &str, info: &str, hash: Vec<u8>) -> Self {
        Self {
            protocol: protocol.to_string(),
            info: info.to_string(),
            certificate_hash: Some(hash),
        }
    }

    /// The `ip:port` prefix of the binding information.
    ///
    /// The host permits one TLS certificate per endpoint, so conflict
    /// detection compares https bindings on this prefix alone.
    pub fn endpoint(info: &str) -> &str {
        match info.rfind(':') {
            Some(idx) => &info[..idx],
            None => info,
        }
    }
}

/// A virtual application under a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    /// Virtual path, beginning with `/`.
    pub path: String,
    /// Physical directory backing the application.
    pub physical_path: String,
    /// Application pool the application runs under.
    pub pool: String,
}

impl ApplicationRecord {
    pub fn new(path: &str, physical_path: &str, pool: &str) -> Self {
        Self {
            path: path.to_string(),
            physical_path: physical_path.to_string(),
            pool: pool.to_string(),
        }
    }
}

/// An installed certificate as enumerated from the machine trust store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Friendly name; may be blank.
    pub friendly_name: String,
    /// Distinguished subject, e.g. `CN=example.org, O=Example`.
    pub subject: String,
    /// Raw certificate hash.
    pub hash: Vec<u8>,
    /// Uppercase hex rendering of the hash.
    pub thumbprint: String,
}

impl CertificateRecord {
    /// Build a record, deriving the thumbprint from the raw hash.
    pub fn new(friendly_name: &str, subject: &str, hash: Vec<u8>) -> Self {
        let thumbprint = hex::encode_upper(&hash);
        Self {
            friendly_name: friendly_name.to_string(),
            subject: subject.to_string(),
            hash,
            thumbprint,
        }
    }
}
