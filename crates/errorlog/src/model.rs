//! Error-log model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One application error harvested from a site's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationError {
    /// Id assigned by the harvester, unique across the log.
    pub id: i64,
    /// Host-assigned id of the site the error belongs to.
    pub site_id: u32,
    pub message: String,
    pub exception_type: String,
    pub timestamp: DateTime<Utc>,
    /// Full event text, including stack trace when present.
    pub full_message: String,
}
