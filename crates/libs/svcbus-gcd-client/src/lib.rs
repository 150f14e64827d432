//! The proxy abstraction in front of the remote global capabilities
//! directory. The wire transport and the generated IDL proxy are external
//! collaborators — this crate only defines the contract and the
//! per-request GBID selection it requires, plus an in-memory test double
//! used by this crate's own tests and by `svcbus-capabilities-directory`'s.

mod known_gbids;
pub mod test_support;

pub use known_gbids::KnownGbids;

use async_trait::async_trait;
use svcbus_discovery_types::DiscoveryError;

pub use svcbus_discovery_types::GlobalDiscoveryEntry;

/// Proxy to a remote global capabilities directory. Every call is scoped to
/// a single backend by the `gbid`/`gbids` parameter — there is no
/// "broadcast to all backends" operation at this layer; callers that must
/// reach several backends issue several calls.
#[async_trait]
pub trait GlobalCapabilitiesDirectoryClient: Send + Sync {
    async fn add(&self, entry: GlobalDiscoveryEntry, gbids: Vec<String>) -> Result<(), DiscoveryError>;

    async fn remove(&self, participant_id: &str, gbids: Vec<String>) -> Result<(), DiscoveryError>;

    async fn lookup_by_domain_interface(
        &self,
        domains: Vec<String>,
        interface_name: &str,
        gbids: Vec<String>,
        ttl_ms: i64,
    ) -> Result<Vec<GlobalDiscoveryEntry>, DiscoveryError>;

    async fn lookup_by_participant_id(
        &self,
        participant_id: &str,
        gbids: Vec<String>,
        ttl_ms: i64,
    ) -> Result<Option<GlobalDiscoveryEntry>, DiscoveryError>;

    async fn touch(
        &self,
        cluster_controller_id: &str,
        participant_ids: Vec<String>,
        gbid: &str,
    ) -> Result<(), DiscoveryError>;

    async fn remove_stale(
        &self,
        cluster_controller_id: &str,
        max_last_seen_date_ms: i64,
        gbid: &str,
    ) -> Result<(), DiscoveryError>;
}
