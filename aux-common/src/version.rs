//! Version vectors used to stamp edits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Site ID to the latest edit timestamp seen from that site.
pub type VersionVector = BTreeMap<String, u64>;

/// Version of the state the runtime is currently looking at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentVersion {
    /// Site ID of the local device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_site: Option<String>,
    /// Site ID used for edits that arrive from remote devices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_site: Option<String>,
    /// Latest timestamp per site
    #[serde(default)]
    pub vector: VersionVector,
}

impl CurrentVersion {
    /// Create a version for the given local site.
    pub fn new(current_site: impl Into<String>) -> Self {
        Self {
            current_site: Some(current_site.into()),
            ..Default::default()
        }
    }

    /// Set the timestamp recorded for a site.
    pub fn with_site_time(mut self, site: impl Into<String>, time: u64) -> Self {
        self.vector.insert(site.into(), time);
        self
    }
}
