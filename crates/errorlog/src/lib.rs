//! siteman-errorlog: persistent log of application errors harvested from
//! site event logs, keyed by the host-assigned site id.
//!
//! Rows arrive in batches from an external harvester with their ids already
//! assigned; this crate only stores and queries them.

mod error;
mod model;
mod store;

pub use error::LogError;
pub use model::ApplicationError;
pub use store::ErrorLog;

/// Result type for error-log operations
pub type Result<T> = std::result::Result<T, LogError>;
