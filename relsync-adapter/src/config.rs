//! Adapter configuration.

use crate::error::{AdapterError, AdapterResult};
use serde::{Deserialize, Serialize};

/// Hints telling the host framework when to reload records.
///
/// The change listener keeps records current, so every hint defaults to
/// `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadPolicy {
    pub should_reload_all: bool,
    pub should_background_reload_all: bool,
    pub should_reload_record: bool,
    pub should_background_reload_record: bool,
}

impl Default for ReloadPolicy {
    fn default() -> Self {
        Self {
            should_reload_all: true,
            should_background_reload_all: true,
            should_reload_record: true,
            should_background_reload_record: true,
        }
    }
}

/// Configuration for an [`Adapter`](crate::Adapter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Live and retry flag for replication started via
    /// [`Adapter::start_default_replication`](crate::Adapter::start_default_replication).
    pub live_retry: bool,
    /// Attach document bodies to change listener events.
    pub include_docs: bool,
    /// Let the host framework batch single-record lookups into `find_many`.
    pub coalesce_find_requests: bool,
    pub reload: ReloadPolicy,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            live_retry: true,
            include_docs: false,
            coalesce_find_requests: true,
            reload: ReloadPolicy::default(),
        }
    }
}

impl AdapterConfig {
    /// Parses a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> AdapterResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| AdapterError::Configuration(format!("invalid adapter config: {e}")))
    }
}
