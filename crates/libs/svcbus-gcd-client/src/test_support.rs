//! An in-memory [`GlobalCapabilitiesDirectoryClient`] double. Exercises the
//! same call shape a real RPC proxy would, without any transport — used by
//! this crate's own tests and by `svcbus-capabilities-directory`'s.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use svcbus_discovery_types::DiscoveryError;

use crate::{GlobalCapabilitiesDirectoryClient, GlobalDiscoveryEntry};

#[derive(Default)]
pub struct InMemoryGcdClient {
    entries: Mutex<HashMap<String, GlobalDiscoveryEntry>>,
    /// When set, every call fails with this error instead of touching state
    /// — used to exercise the capabilities-directory's error propagation.
    fail_with: Mutex<Option<DiscoveryError>>,
}

impl InMemoryGcdClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_calls_with(&self, error: DiscoveryError) {
        *self.fail_with.lock() = Some(error);
    }

    pub fn clear_failure(&self) {
        *self.fail_with.lock() = None;
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.entries.lock().contains_key(participant_id)
    }

    fn maybe_fail(&self) -> Result<(), DiscoveryError> {
        match self.fail_with.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GlobalCapabilitiesDirectoryClient for InMemoryGcdClient {
    async fn add(&self, entry: GlobalDiscoveryEntry, _gbids: Vec<String>) -> Result<(), DiscoveryError> {
        self.maybe_fail()?;
        self.entries
            .lock()
            .insert(entry.entry.participant_id.clone(), entry);
        Ok(())
    }

    async fn remove(&self, participant_id: &str, _gbids: Vec<String>) -> Result<(), DiscoveryError> {
        self.maybe_fail()?;
        self.entries.lock().remove(participant_id);
        Ok(())
    }

    async fn lookup_by_domain_interface(
        &self,
        domains: Vec<String>,
        interface_name: &str,
        _gbids: Vec<String>,
        _ttl_ms: i64,
    ) -> Result<Vec<GlobalDiscoveryEntry>, DiscoveryError> {
        self.maybe_fail()?;
        Ok(self
            .entries
            .lock()
            .values()
            .filter(|global| {
                domains.contains(&global.entry.domain) && global.entry.interface_name == interface_name
            })
            .cloned()
            .collect())
    }

    async fn lookup_by_participant_id(
        &self,
        participant_id: &str,
        _gbids: Vec<String>,
        _ttl_ms: i64,
    ) -> Result<Option<GlobalDiscoveryEntry>, DiscoveryError> {
        self.maybe_fail()?;
        Ok(self.entries.lock().get(participant_id).cloned())
    }

    async fn touch(
        &self,
        _cluster_controller_id: &str,
        _participant_ids: Vec<String>,
        _gbid: &str,
    ) -> Result<(), DiscoveryError> {
        self.maybe_fail()
    }

    async fn remove_stale(
        &self,
        _cluster_controller_id: &str,
        _max_last_seen_date_ms: i64,
        _gbid: &str,
    ) -> Result<(), DiscoveryError> {
        self.maybe_fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svcbus_address::Address;
    use svcbus_discovery_types::{DiscoveryEntry, ProviderQos, ProviderScope, Version};

    fn entry(participant_id: &str) -> GlobalDiscoveryEntry {
        GlobalDiscoveryEntry {
            entry: DiscoveryEntry {
                provider_version: Version::new(1, 0),
                domain: "d".into(),
                interface_name: "i".into(),
                participant_id: participant_id.into(),
                provider_qos: ProviderQos {
                    priority: 0,
                    scope: ProviderScope::Global,
                    supports_on_change_subscriptions: false,
                    custom_parameters: Vec::new(),
                },
                last_seen_date_ms: 0,
                expiry_date_ms: i64::MAX,
                public_key_id: String::new(),
            },
            address: Address::mqtt("tcp://b", "t"),
        }
    }

    #[tokio::test]
    async fn add_then_lookup_round_trips() {
        let client = InMemoryGcdClient::new();
        client.add(entry("P1"), vec!["gbid-a".into()]).await.unwrap();
        let found = client
            .lookup_by_participant_id("P1", vec!["gbid-a".into()], 1_000)
            .await
            .unwrap();
        assert_eq!(found.unwrap().entry.participant_id, "P1");
    }

    #[tokio::test]
    async fn remove_clears_the_entry() {
        let client = InMemoryGcdClient::new();
        client.add(entry("P1"), vec![]).await.unwrap();
        client.remove("P1", vec![]).await.unwrap();
        assert!(!client.contains("P1"));
    }

    #[tokio::test]
    async fn injected_failure_is_returned_instead_of_mutating_state() {
        let client = InMemoryGcdClient::new();
        client.fail_next_calls_with(DiscoveryError::ShutdownInProgress);
        let result = client.add(entry("P1"), vec![]).await;
        assert!(result.is_err());
        assert!(!client.contains("P1"));
    }
}
