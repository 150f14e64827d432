use serde::{Deserialize, Serialize};

/// Tuning knobs for the local capabilities directory's maintenance loops
/// and access-control gating. Defaults mirror the cluster controller's own
/// config document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LcdConfig {
    pub capabilities_freshness_update_interval_ms: u64,
    pub purge_expired_discovery_entries_interval_ms: u64,
    pub re_add_all_globals_interval_ms: u64,
    pub default_expiry_interval_ms: i64,
    pub enable_access_controller: bool,
    pub acl_audit: bool,
    pub is_local_capabilities_directory_persistency_enabled: bool,
    pub global_cache_capacity: usize,
    /// Where locally registered entries are saved to and loaded from when
    /// `is_local_capabilities_directory_persistency_enabled` is set. Inert
    /// if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locals_persistence_path: Option<std::path::PathBuf>,
}

impl Default for LcdConfig {
    fn default() -> Self {
        Self {
            capabilities_freshness_update_interval_ms: 60_000,
            purge_expired_discovery_entries_interval_ms: 60_000,
            re_add_all_globals_interval_ms: 3_600_000,
            default_expiry_interval_ms: 6 * 30 * 24 * 60 * 60 * 1000,
            enable_access_controller: false,
            acl_audit: false,
            is_local_capabilities_directory_persistency_enabled: true,
            global_cache_capacity: 1000,
            locals_persistence_path: None,
        }
    }
}
