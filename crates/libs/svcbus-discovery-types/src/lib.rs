//! Discovery domain types shared by the capabilities store, the global
//! directory client, and the arbitrator: entries, QoS, and version
//! compatibility.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use svcbus_address::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// A provider is compatible with a consumer iff majors match and the
    /// provider's minor is at least the consumer's.
    pub fn is_compatible_with(&self, consumer: &Version) -> bool {
        self.major == consumer.major && self.minor >= consumer.minor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderScope {
    Local,
    Global,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderQos {
    pub priority: i64,
    pub scope: ProviderScope,
    pub supports_on_change_subscriptions: bool,
    /// Ordered map of name -> value, preserving insertion order the way the
    /// original custom-parameter list does.
    pub custom_parameters: Vec<(String, String)>,
}

impl ProviderQos {
    pub fn custom_parameter(&self, name: &str) -> Option<&str> {
        self.custom_parameters
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryEntry {
    pub provider_version: Version,
    pub domain: String,
    pub interface_name: String,
    pub participant_id: String,
    pub provider_qos: ProviderQos,
    pub last_seen_date_ms: i64,
    pub expiry_date_ms: i64,
    pub public_key_id: String,
}

impl DiscoveryEntry {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms > self.expiry_date_ms
    }

    pub fn matches_domain_interface(&self, domain: &str, interface_name: &str) -> bool {
        self.domain == domain && self.interface_name == interface_name
    }
}

/// A [`DiscoveryEntry`] as known to the global directory: adds the
/// provider's serialized transport address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDiscoveryEntry {
    pub entry: DiscoveryEntry,
    pub address: Address,
}

/// A [`DiscoveryEntry`] annotated with whether it came from the local
/// registry or the cached/global view, for consumers that need to tell them
/// apart (e.g. de-duplication prefers local).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryEntryWithMetaInfo {
    pub entry: DiscoveryEntry,
    pub is_local: bool,
}

impl DiscoveryEntryWithMetaInfo {
    pub fn local(entry: DiscoveryEntry) -> Self {
        Self {
            entry,
            is_local: true,
        }
    }

    pub fn cached(entry: DiscoveryEntry) -> Self {
        Self {
            entry,
            is_local: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryScope {
    LocalOnly,
    LocalThenGlobal,
    LocalAndGlobal,
    GlobalOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArbitrationStrategy {
    LastSeen,
    HighestPriority,
    Keyword,
    FixedParticipant,
    LocalOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryQos {
    pub discovery_timeout_ms: i64,
    pub retry_interval_ms: i64,
    pub cache_max_age_ms: i64,
    pub discovery_scope: DiscoveryScope,
    pub provider_must_support_on_change: bool,
    pub arbitration_strategy: ArbitrationStrategy,
    pub custom_parameters: BTreeMap<String, String>,
}

impl DiscoveryQos {
    /// `-1` disables age filtering.
    pub fn cache_age_filter_enabled(&self) -> bool {
        self.cache_max_age_ms >= 0
    }
}

/// The outcome of a successful arbitration: the selected provider plus every
/// version observed among candidates that was filtered out as incompatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationResult {
    pub selected: DiscoveryEntryWithMetaInfo,
    pub incompatible_versions: Vec<Version>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    #[error("invalid gbid among {gbids:?}")]
    InvalidGbid { gbids: Vec<String> },

    #[error("unknown gbid: {gbid}")]
    UnknownGbid { gbid: String },

    #[error("no entry for participant {participant_id}")]
    NoEntryForParticipant { participant_id: String },

    #[error("no compatible provider found, observed versions: {incompatible_versions:?}")]
    NoCompatibleProviderFound { incompatible_versions: Vec<Version> },

    #[error("provider runtime error: {message}")]
    ProviderRuntime { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("shutdown in progress")]
    ShutdownInProgress,
}
