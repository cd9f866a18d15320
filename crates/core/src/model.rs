//! Domain model
//!
//! Value objects rebuilt from host state on every read; the engine keeps no
//! state of its own between calls. A `Site` passed into a mutating operation
//! is the caller's desired end-state and is discarded once applied.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Binding protocols the engine manages; everything else the host knows
/// (ftp and friends) is out of scope and dropped during translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// Returns the protocol name as the host spells it
    pub const fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Run state of a site or application pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Starting,
    Started,
    Stopping,
    Stopped,
    Unknown,
}

impl InstanceState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Starting => "starting",
            InstanceState::Started => "started",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Unknown => "unknown",
        }
    }

    /// True once the instance has settled in a stable run state.
    pub const fn is_settled(&self) -> bool {
        matches!(self, InstanceState::Started | InstanceState::Stopped)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single binding a site listens on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub protocol: Protocol,
    /// Empty string means wildcard hostname.
    pub hostname: String,
    /// `*` denotes all interfaces.
    pub ip_address: String,
    pub port: u16,
    /// Resolved certificate display name, https only.
    pub certificate_name: Option<String>,
    /// Certificate thumbprint, https only.
    pub certificate_thumbprint: Option<String>,
}

impl Binding {
    /// Plain http binding.
    pub fn http(ip_address: &str, port: u16, hostname: &str) -> Self {
        Self {
            protocol: Protocol::Http,
            hostname: hostname.to_string(),
            ip_address: ip_address.to_string(),
            port,
            certificate_name: None,
            certificate_thumbprint: None,
        }
    }

    /// Https binding resolved against a trust store certificate.
    pub fn https(ip_address: &str, port: u16, hostname: &str, thumbprint: &str) -> Self {
        Self {
            protocol: Protocol::Https,
            hostname: hostname.to_string(),
            ip_address: ip_address.to_string(),
            port,
            certificate_name: None,
            certificate_thumbprint: Some(thumbprint.to_string()),
        }
    }

    /// Render the binding in the host's `ip:port:hostname` notation, used
    /// both for comparison and for mutation calls.
    pub fn to_host_info(&self) -> String {
        format!("{}:{}:{}", self.ip_address, self.port, self.hostname)
    }
}

/// A secondary virtual application under a site.
///
/// The primary application is never represented this way; it is folded into
/// the site's own `site_path` / `application_pool` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteApplication {
    /// Virtual path; normalized to start with `/` during reconciliation.
    pub path: String,
    pub disk_path: String,
    pub application_pool: String,
}

impl SiteApplication {
    pub fn new(path: &str, disk_path: &str, application_pool: &str) -> Self {
        Self {
            path: path.to_string(),
            disk_path: disk_path.to_string(),
            application_pool: application_pool.to_string(),
        }
    }
}

/// A web site and everything the engine manages about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Host-assigned id; 0 on a site that has not been created yet.
    pub id: u32,
    pub name: String,
    /// Physical path of the primary application.
    pub site_path: String,
    /// Pool of the primary application; empty asks create to auto-name one.
    pub application_pool: String,
    pub site_state: InstanceState,
    /// `None` when the caller asked to skip the pool state round-trip.
    pub application_pool_state: Option<InstanceState>,
    pub log_file_directory: String,
    pub bindings: Vec<Binding>,
    pub applications: Vec<SiteApplication>,
}

/// An installed certificate, derived fresh from the trust store per lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub name: String,
    pub hash: Vec<u8>,
    pub thumbprint: String,
}

/// Outcome of [`SiteReconciler::create_site`](crate::SiteReconciler::create_site).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateSiteResult {
    /// Site created and settled; carries the host-assigned id.
    Success { id: u32 },
    /// A desired binding collides with one already on the host; nothing was
    /// mutated.
    BindingAlreadyInUse,
    /// The host never reached a stable run state within the poll bound. The
    /// partially created site is left in place for the operator.
    Failed,
}

/// Outcome of [`SiteReconciler::start_site`](crate::SiteReconciler::start_site).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteStartResult {
    Started,
    BindingIsAlreadyInUse,
    CannotAccessSitePath,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_renders_host_notation() {
        let binding = Binding::http("*", 80, "example.org");
        assert_eq!(binding.to_host_info(), "*:80:example.org");
    }

    #[test]
    fn wildcard_hostname_renders_trailing_colon() {
        let binding = Binding::http("10.0.0.1", 8080, "");
        assert_eq!(binding.to_host_info(), "10.0.0.1:8080:");
    }

    #[test]
    fn settled_states() {
        assert!(InstanceState::Started.is_settled());
        assert!(InstanceState::Stopped.is_settled());
        assert!(!InstanceState::Starting.is_settled());
        assert!(!InstanceState::Stopping.is_settled());
    }

    #[test]
    fn protocol_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Protocol::Https).unwrap(), "\"https\"");
    }
}
