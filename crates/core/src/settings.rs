//! Engine settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for the reconciler's convergence waits.
///
/// Defaults mirror the host's observed behavior: sites usually settle well
/// inside 3 seconds, and deletes need a short grace period before the host
/// reports consistent state again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Delay between readiness probes after site creation.
    pub poll_interval_ms: u64,
    /// Upper bound on the readiness poll; expiry yields `Failed`.
    pub create_timeout_ms: u64,
    /// Settle sleep after a site delete commits.
    pub delete_settle_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            create_timeout_ms: 3000,
            delete_settle_ms: 500,
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn create_timeout(&self) -> Duration {
        Duration::from_millis(self.create_timeout_ms)
    }

    pub fn delete_settle(&self) -> Duration {
        Duration::from_millis(self.delete_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_host_tuning() {
        let settings = EngineSettings::default();
        assert_eq!(settings.poll_interval(), Duration::from_millis(100));
        assert_eq!(settings.create_timeout(), Duration::from_secs(3));
        assert_eq!(settings.delete_settle(), Duration::from_millis(500));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{"create_timeout_ms": 250}"#).unwrap();
        assert_eq!(settings.create_timeout_ms, 250);
        assert_eq!(settings.poll_interval_ms, 100);
        assert_eq!(settings.delete_settle_ms, 500);
    }
}
