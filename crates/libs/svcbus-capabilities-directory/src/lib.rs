//! The Local Capabilities Directory: the orchestrator in front of the LCD
//! store, the global directory client, the message router, and the local
//! access-control hook.
//!
//! Every operation is a plain `async fn` returning a `Result` rather than
//! a callback pair, matching how this crate family expresses RPC-backed
//! operations elsewhere (see `svcbus-router`'s `schedule` and this
//! workspace's `styrene-ipc` request/response calls).

mod config;
mod freshness;
mod persistence;

pub use config::LcdConfig;

use std::sync::Arc;

use async_trait::async_trait;
use svcbus_address::Address;
use svcbus_discovery_types::{
    DiscoveryEntry, DiscoveryEntryWithMetaInfo, DiscoveryError, DiscoveryQos, ProviderScope,
};
use svcbus_gcd_client::{GlobalCapabilitiesDirectoryClient, GlobalDiscoveryEntry, KnownGbids};
use svcbus_message::now_ms;
use svcbus_router::Router;
use tokio::task::JoinHandle;

use svcbus_capabilities_store::{LcdStore, LookupOutcome};

/// Hook into the local access-control policy evaluator. The policy engine
/// itself lives outside this crate; only the hook shape is described here.
pub trait ProviderAccessController: Send + Sync {
    fn can_register_provider(&self, participant_id: &str, domain: &str, interface_name: &str) -> bool;
}

/// The GBID a registration's own RPC is addressed through, and the full
/// visibility list it's registered against.
fn rpc_gbid(gbids: &[String]) -> String {
    gbids.first().cloned().unwrap_or_default()
}

pub struct LocalCapabilitiesDirectory {
    store: LcdStore,
    gcd_client: Arc<dyn GlobalCapabilitiesDirectoryClient>,
    router: Arc<Router>,
    known_gbids: KnownGbids,
    access_controller: Option<Arc<dyn ProviderAccessController>>,
    cluster_controller_id: String,
    config: LcdConfig,
    maintenance_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl LocalCapabilitiesDirectory {
    pub fn new(
        cluster_controller_id: impl Into<String>,
        gcd_client: Arc<dyn GlobalCapabilitiesDirectoryClient>,
        router: Arc<Router>,
        known_gbids: KnownGbids,
        access_controller: Option<Arc<dyn ProviderAccessController>>,
        config: LcdConfig,
    ) -> Arc<Self> {
        let store = LcdStore::new(config.global_cache_capacity);
        if config.is_local_capabilities_directory_persistency_enabled {
            if let Some(path) = &config.locals_persistence_path {
                if let Some(document) = persistence::load(path) {
                    for persisted in document.entries {
                        store.insert_local(persisted.entry.clone());
                        if persisted.entry.provider_qos.scope == ProviderScope::Global {
                            store.insert_global(persisted.entry, persisted.gbids, now_ms());
                        }
                    }
                }
            }
        }
        Arc::new(Self {
            store,
            gcd_client,
            router,
            known_gbids,
            access_controller,
            cluster_controller_id: cluster_controller_id.into(),
            config,
            maintenance_handles: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    /// Writes every locally registered entry (with its known gbids) to
    /// `locals_persistence_path` when
    /// `is_local_capabilities_directory_persistency_enabled` and a path are
    /// both configured. Failures are logged, not propagated — a mutation
    /// that already landed in the store should not fail the caller because
    /// the disk write did not keep up.
    fn persist_locals_if_enabled(&self) {
        if !self.config.is_local_capabilities_directory_persistency_enabled {
            return;
        }
        let Some(path) = &self.config.locals_persistence_path else {
            return;
        };
        let entries: Vec<persistence::PersistedLocal> = self
            .store
            .all_locals()
            .into_iter()
            .map(|entry| {
                let gbids = self.store.gbids_for_participant(&entry.participant_id);
                persistence::PersistedLocal { entry, gbids }
            })
            .collect();
        if let Err(err) = persistence::save(path, entries) {
            log::warn!("failed to persist LCD locals to {}: {err}", path.display());
        }
    }

    /// `gbids` empty is expanded to every known backend.
    pub async fn add(
        &self,
        entry: DiscoveryEntry,
        await_global_registration: bool,
        gbids: Vec<String>,
    ) -> Result<(), DiscoveryError> {
        let gbids = self.known_gbids.validate(&gbids)?;
        self.check_provider_permission(&entry)?;

        let is_global = entry.provider_qos.scope == ProviderScope::Global;
        if !is_global || !await_global_registration {
            self.insert_local_and_cache(entry, &gbids);
            return Ok(());
        }

        let address = self.router.lookup_next_hop_address(&entry.participant_id).await.ok_or_else(|| {
            DiscoveryError::ProviderRuntime {
                message: format!(
                    "no routing entry for participantId={}; register a next hop before advertising globally",
                    entry.participant_id
                ),
            }
        })?;
        let global_entry = GlobalDiscoveryEntry {
            entry: entry.clone(),
            address,
        };
        self.gcd_client.add(global_entry, vec![rpc_gbid(&gbids)]).await?;
        self.insert_local_and_cache(entry, &gbids);
        Ok(())
    }

    fn check_provider_permission(&self, entry: &DiscoveryEntry) -> Result<(), DiscoveryError> {
        if !self.config.enable_access_controller {
            return Ok(());
        }
        let Some(access_controller) = &self.access_controller else {
            return Ok(());
        };
        let allowed = access_controller.can_register_provider(
            &entry.participant_id,
            &entry.domain,
            &entry.interface_name,
        );
        if allowed {
            return Ok(());
        }
        if self.config.acl_audit {
            log::warn!(
                "access controller would deny provider registration for participantId={} domain={} interface={} (aclAudit: allowing)",
                entry.participant_id, entry.domain, entry.interface_name
            );
            return Ok(());
        }
        Err(DiscoveryError::ProviderRuntime {
            message: format!(
                "provider registration denied for participantId={}",
                entry.participant_id
            ),
        })
    }

    fn insert_local_and_cache(&self, entry: DiscoveryEntry, gbids: &[String]) {
        let is_global = entry.provider_qos.scope == ProviderScope::Global;
        self.store.insert_local(entry.clone());
        if is_global {
            self.store.insert_global(entry, gbids.to_vec(), now_ms());
        }
        self.persist_locals_if_enabled();
    }

    /// Lookup by (domain, interfaceName).
    pub async fn lookup_by_domain_interface(
        &self,
        domains: Vec<String>,
        interface_name: &str,
        discovery_qos: DiscoveryQos,
        gbids: Vec<String>,
    ) -> Result<Vec<DiscoveryEntryWithMetaInfo>, DiscoveryError> {
        let gbids = self.known_gbids.validate(&gbids)?;
        let now = now_ms();

        let mut local_answer = None;
        for domain in &domains {
            match self.store.lookup_by_domain_interface(domain, interface_name, &discovery_qos, &gbids, now) {
                LookupOutcome::Answered(entries) => {
                    local_answer.get_or_insert_with(Vec::new).extend(entries);
                }
                LookupOutcome::Deferred => {}
            }
        }
        if let Some(entries) = local_answer {
            return Ok(entries);
        }

        let ttl_ms = self.config.capabilities_freshness_update_interval_ms as i64;
        let global_result = self
            .gcd_client
            .lookup_by_domain_interface(domains.clone(), interface_name, gbids.clone(), ttl_ms)
            .await;

        // A late global response is ignored if a concurrent local `add`
        // already satisfied this lookup. Re-checking the local view after
        // the await does this without a pending-lookup coalescing map,
        // since every lookup here awaits its own RPC rather than sharing
        // a coalesced future.
        let mut settled = None;
        for domain in &domains {
            if let LookupOutcome::Answered(entries) =
                self.store.lookup_by_domain_interface(domain, interface_name, &discovery_qos, &gbids, now_ms())
            {
                settled.get_or_insert_with(Vec::new).extend(entries);
            }
        }
        if let Some(entries) = settled {
            log::debug!(
                "lookup for domain(s)={domains:?} interface={interface_name} satisfied locally while global RPC was in flight; discarding global response"
            );
            return Ok(entries);
        }

        let global_entries = global_result?;
        let mut merged = Vec::with_capacity(global_entries.len());
        for global in global_entries {
            self.register_discovered_provider(&global).await;
            let discovered_gbid = self.gbid_for_discovered_provider(&global);
            self.store.insert_global(global.entry.clone(), vec![discovered_gbid], now_ms());
            merged.push(DiscoveryEntryWithMetaInfo::cached(global.entry));
        }
        Ok(merged)
    }

    /// Lookup by participant id. Zero entries resolves to
    /// `NoEntryForParticipant`.
    pub async fn lookup_by_participant_id(
        &self,
        participant_id: &str,
        discovery_qos: DiscoveryQos,
        gbids: Vec<String>,
    ) -> Result<DiscoveryEntryWithMetaInfo, DiscoveryError> {
        let gbids = self.known_gbids.validate(&gbids)?;
        let now = now_ms();

        match self.store.lookup_by_participant_id(participant_id, &discovery_qos, &gbids, now) {
            LookupOutcome::Answered(Some(entry)) => return Ok(entry),
            LookupOutcome::Answered(None) => {
                return Err(DiscoveryError::NoEntryForParticipant {
                    participant_id: participant_id.to_string(),
                });
            }
            LookupOutcome::Deferred => {}
        }

        let ttl_ms = self.config.capabilities_freshness_update_interval_ms as i64;
        let global_result = self
            .gcd_client
            .lookup_by_participant_id(participant_id, gbids.clone(), ttl_ms)
            .await;

        match self.store.lookup_by_participant_id(participant_id, &discovery_qos, &gbids, now_ms()) {
            LookupOutcome::Answered(Some(entry)) => return Ok(entry),
            LookupOutcome::Answered(None) => {
                return Err(DiscoveryError::NoEntryForParticipant {
                    participant_id: participant_id.to_string(),
                });
            }
            LookupOutcome::Deferred => {}
        }

        match global_result {
            Ok(Some(global)) => {
                self.register_discovered_provider(&global).await;
                let discovered_gbid = self.gbid_for_discovered_provider(&global);
                self.store.insert_global(global.entry.clone(), vec![discovered_gbid], now_ms());
                Ok(DiscoveryEntryWithMetaInfo::cached(global.entry))
            }
            Ok(None) => Err(DiscoveryError::NoEntryForParticipant {
                participant_id: participant_id.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    /// Registers a provider discovered through the global directory as a
    /// next hop in the router: its own broker URI becomes its gbid for an
    /// Mqtt address, otherwise the configured default gbid is used.
    async fn register_discovered_provider(&self, global: &GlobalDiscoveryEntry) {
        let is_globally_visible = global.entry.provider_qos.scope == ProviderScope::Global;
        self.router
            .add_next_hop(
                global.entry.participant_id.clone(),
                global.address.clone(),
                is_globally_visible,
                global.entry.expiry_date_ms,
                false,
            )
            .await;
    }

    /// The gbid a freshly discovered provider is cached under: its own
    /// broker uri for an Mqtt address, the configured default gbid
    /// otherwise.
    fn gbid_for_discovered_provider(&self, global: &GlobalDiscoveryEntry) -> String {
        global
            .address
            .mqtt_broker_uri()
            .map(str::to_string)
            .unwrap_or_else(|| self.known_gbids.default_gbid().to_string())
    }

    /// Removes a provider: local-only entries are dropped in place; a
    /// globally visible one is also retracted from the directory it was
    /// registered in.
    pub async fn remove(&self, participant_id: &str) -> Result<(), DiscoveryError> {
        let gbids = self.store.gbids_for_participant(participant_id);
        if !gbids.is_empty() {
            self.gcd_client.remove(participant_id, gbids).await?;
        }
        self.store.remove_by_participant_id(participant_id);
        self.router.remove_next_hop(participant_id).await;
        self.persist_locals_if_enabled();
        Ok(())
    }

    pub fn get_all_global_capabilities(&self) -> Vec<DiscoveryEntry> {
        self.store.get_all_global_capabilities()
    }

    /// One `touch` RPC per first-known-gbid group of locally registered
    /// GLOBAL providers.
    pub async fn run_freshness_touch(&self) {
        freshness::run_freshness_touch(&self.store, &*self.gcd_client, &self.cluster_controller_id).await;
    }

    /// Replays every locally registered GLOBAL entry to the global
    /// directory, recovering from remote state loss.
    pub async fn reregister_all_globals(&self) -> Result<(), DiscoveryError> {
        let locals = self.store.locally_registered_globals();
        for entry in locals {
            let gbids = self.store.gbids_for_participant(&entry.participant_id);
            let gbids = if gbids.is_empty() {
                self.known_gbids.known().to_vec()
            } else {
                gbids
            };
            if let Some(address) = self.router.lookup_next_hop_address(&entry.participant_id).await {
                let global_entry = GlobalDiscoveryEntry {
                    entry,
                    address,
                };
                self.gcd_client.add(global_entry, vec![rpc_gbid(&gbids)]).await?;
            }
        }
        Ok(())
    }

    /// Removes expired entries from both stores, unregisters their router
    /// next-hops, then persists the surviving locals.
    pub async fn purge_expired(&self) {
        let removed = self.store.purge_expired(now_ms());
        for participant_id in removed {
            self.router.remove_next_hop(&participant_id).await;
        }
        self.persist_locals_if_enabled();
    }

    /// Stale-provider removal on startup: one `removeStale` RPC per known
    /// gbid, retried on a transient runtime error.
    pub async fn remove_stale_on_startup(&self, start_timestamp_ms: i64) {
        for gbid in self.known_gbids.known() {
            let mut attempt = 0u32;
            loop {
                match self
                    .gcd_client
                    .remove_stale(&self.cluster_controller_id, start_timestamp_ms, gbid)
                    .await
                {
                    Ok(()) => break,
                    Err(DiscoveryError::ProviderRuntime { message }) if attempt < 3 => {
                        attempt += 1;
                        log::warn!("removeStale failed for gbid={gbid} (attempt {attempt}): {message}; retrying");
                    }
                    Err(err) => {
                        log::error!("removeStale failed permanently for gbid={gbid}: {err}");
                        break;
                    }
                }
            }
        }
    }

    /// Refreshes `lastSeenDateMs`/`expiryDateMs` on every stored local,
    /// then re-adds every GLOBAL one.
    pub async fn trigger_global_provider_reregistration(&self) -> Result<(), DiscoveryError> {
        let now = now_ms();
        let min_expiry = now + self.config.default_expiry_interval_ms;
        self.store.touch_all_locals(now, min_expiry);
        self.reregister_all_globals().await
    }

    /// Spawns the freshness-touch, re-add-all-globals, and expiry-purge
    /// maintenance loops, mirroring `Router::start_maintenance`.
    pub fn start_maintenance(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let freshness_period = std::time::Duration::from_millis(self.config.capabilities_freshness_update_interval_ms);
        let freshness_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(freshness_period);
            loop {
                ticker.tick().await;
                let Some(lcd) = weak.upgrade() else { break };
                lcd.run_freshness_touch().await;
            }
        });

        let weak = Arc::downgrade(self);
        let purge_period = std::time::Duration::from_millis(self.config.purge_expired_discovery_entries_interval_ms);
        let purge_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(purge_period);
            loop {
                ticker.tick().await;
                let Some(lcd) = weak.upgrade() else { break };
                lcd.purge_expired().await;
            }
        });

        let weak = Arc::downgrade(self);
        let re_add_period = std::time::Duration::from_millis(self.config.re_add_all_globals_interval_ms);
        let re_add_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(re_add_period);
            loop {
                ticker.tick().await;
                let Some(lcd) = weak.upgrade() else { break };
                if let Err(err) = lcd.reregister_all_globals().await {
                    log::warn!("periodic re-add-all-globals failed: {err}");
                }
            }
        });

        // `maintenance_handles` is only ever appended to from this method,
        // called once at startup; a blocking lock would also work but the
        // async one keeps this fn consistent with every other await point
        // in this type.
        let handles_slot = self.maintenance_handles.try_lock();
        if let Ok(mut handles) = handles_slot {
            handles.push(freshness_task);
            handles.push(purge_task);
            handles.push(re_add_task);
        }
    }

    pub async fn shutdown(&self) {
        let mut handles = self.maintenance_handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
    }
}

/// Bridges the LCD into `svcbus-arbitrator`'s retry loop: the arbitrator is
/// the consumer-side caller, the LCD is "the discovery service" it queries.
#[async_trait]
impl svcbus_arbitrator::DiscoveryProxy for LocalCapabilitiesDirectory {
    async fn lookup_by_domains(
        &self,
        domains: &[String],
        interface_name: &str,
        discovery_qos: &DiscoveryQos,
        gbids: &[String],
    ) -> Result<Vec<DiscoveryEntryWithMetaInfo>, DiscoveryError> {
        self.lookup_by_domain_interface(
            domains.to_vec(),
            interface_name,
            discovery_qos.clone(),
            gbids.to_vec(),
        )
        .await
    }

    async fn lookup_by_participant_id(
        &self,
        participant_id: &str,
        discovery_qos: &DiscoveryQos,
        gbids: &[String],
    ) -> Result<DiscoveryEntryWithMetaInfo, DiscoveryError> {
        LocalCapabilitiesDirectory::lookup_by_participant_id(
            self,
            participant_id,
            discovery_qos.clone(),
            gbids.to_vec(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use svcbus_discovery_types::{ArbitrationStrategy, DiscoveryScope, ProviderQos, Version};
    use svcbus_gcd_client::test_support::InMemoryGcdClient;
    use svcbus_transport::{MessagingStub, MessagingStubFactory, MulticastAddressCalculator, TransmitError};

    struct NoopCalculator;
    impl MulticastAddressCalculator for NoopCalculator {
        fn calculate(&self, _message: &svcbus_message::Message) -> Vec<Address> {
            Vec::new()
        }
    }

    struct NoopStub;
    #[async_trait]
    impl MessagingStub for NoopStub {
        async fn transmit(&self, _message: &svcbus_message::Message) -> Result<(), TransmitError> {
            Ok(())
        }
    }

    struct NoopStubFactory;
    impl MessagingStubFactory for NoopStubFactory {
        fn create(&self, _address: &Address) -> Option<Box<dyn MessagingStub>> {
            Some(Box::new(NoopStub))
        }
    }

    fn test_router() -> Arc<Router> {
        Router::new(
            None,
            Arc::new(NoopStubFactory),
            Arc::new(NoopCalculator),
            None,
            Vec::new(),
            Default::default(),
        )
    }

    fn entry(participant_id: &str, scope: ProviderScope) -> DiscoveryEntry {
        DiscoveryEntry {
            provider_version: Version::new(1, 0),
            domain: "d".into(),
            interface_name: "i".into(),
            participant_id: participant_id.into(),
            provider_qos: ProviderQos {
                priority: 0,
                scope,
                supports_on_change_subscriptions: false,
                custom_parameters: Vec::new(),
            },
            last_seen_date_ms: 0,
            expiry_date_ms: i64::MAX,
            public_key_id: String::new(),
        }
    }

    fn qos(scope: DiscoveryScope) -> DiscoveryQos {
        DiscoveryQos {
            discovery_timeout_ms: 1_000,
            retry_interval_ms: 50,
            cache_max_age_ms: -1,
            discovery_scope: scope,
            provider_must_support_on_change: false,
            arbitration_strategy: ArbitrationStrategy::LastSeen,
            custom_parameters: BTreeMap::new(),
        }
    }

    fn test_lcd() -> Arc<LocalCapabilitiesDirectory> {
        LocalCapabilitiesDirectory::new(
            "cc-1",
            Arc::new(InMemoryGcdClient::new()),
            test_router(),
            KnownGbids::new(vec!["gbid-a".into(), "gbid-b".into()], "gbid-a"),
            None,
            LcdConfig::default(),
        )
    }

    #[tokio::test]
    async fn local_scope_add_is_synchronous_and_does_not_touch_gcd() {
        let lcd = test_lcd();
        lcd.add(entry("P1", ProviderScope::Local), true, vec![]).await.unwrap();
        let found = lcd
            .lookup_by_participant_id("P1", qos(DiscoveryScope::LocalOnly), vec![])
            .await
            .unwrap();
        assert!(found.is_local);
    }

    #[tokio::test]
    async fn global_add_requires_a_next_hop_first() {
        let lcd = test_lcd();
        let err = lcd
            .add(entry("P1", ProviderScope::Global), true, vec!["gbid-a".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::ProviderRuntime { .. }));
    }

    #[tokio::test]
    async fn global_add_succeeds_once_routed_and_is_visible_via_gcd() {
        let lcd = test_lcd();
        lcd.router
            .add_next_hop("P1", Address::mqtt("tcp://b", "t"), true, i64::MAX, false)
            .await;
        lcd.add(entry("P1", ProviderScope::Global), true, vec!["gbid-a".into()])
            .await
            .unwrap();
        let found = lcd
            .lookup_by_participant_id("P1", qos(DiscoveryScope::LocalOnly), vec![])
            .await
            .unwrap();
        assert!(found.is_local);
    }

    #[tokio::test]
    async fn invalid_gbid_is_rejected() {
        let lcd = test_lcd();
        let gbids = vec!["a".to_string(), "".to_string(), "a".to_string()];
        let err = lcd.add(entry("P1", ProviderScope::Local), true, gbids).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidGbid { .. }));
    }

    #[tokio::test]
    async fn unknown_gbid_is_rejected() {
        let lcd = test_lcd();
        let err = lcd
            .add(entry("P1", ProviderScope::Local), true, vec!["nope".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::UnknownGbid { .. }));
    }

    #[tokio::test]
    async fn lookup_for_unknown_participant_is_no_entry() {
        let lcd = test_lcd();
        let err = lcd
            .lookup_by_participant_id("missing", qos(DiscoveryScope::LocalThenGlobal), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::NoEntryForParticipant { .. }));
    }

    #[tokio::test]
    async fn access_controller_denial_is_surfaced() {
        struct DenyAll;
        impl ProviderAccessController for DenyAll {
            fn can_register_provider(&self, _p: &str, _d: &str, _i: &str) -> bool {
                false
            }
        }
        let mut config = LcdConfig::default();
        config.enable_access_controller = true;
        let lcd = LocalCapabilitiesDirectory::new(
            "cc-1",
            Arc::new(InMemoryGcdClient::new()),
            test_router(),
            KnownGbids::new(vec!["gbid-a".into()], "gbid-a"),
            Some(Arc::new(DenyAll)),
            config,
        );
        let err = lcd.add(entry("P1", ProviderScope::Local), true, vec![]).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::ProviderRuntime { .. }));
    }

    #[tokio::test]
    async fn acl_audit_mode_allows_despite_denial() {
        struct DenyAll(Arc<AtomicUsize>);
        impl ProviderAccessController for DenyAll {
            fn can_register_provider(&self, _p: &str, _d: &str, _i: &str) -> bool {
                self.0.fetch_add(1, Ordering::SeqCst);
                false
            }
        }
        let calls = Arc::new(AtomicUsize::new(0));
        let mut config = LcdConfig::default();
        config.enable_access_controller = true;
        config.acl_audit = true;
        let lcd = LocalCapabilitiesDirectory::new(
            "cc-1",
            Arc::new(InMemoryGcdClient::new()),
            test_router(),
            KnownGbids::new(vec!["gbid-a".into()], "gbid-a"),
            Some(Arc::new(DenyAll(calls.clone()))),
            config,
        );
        lcd.add(entry("P1", ProviderScope::Local), true, vec![]).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn locals_persist_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locals.json");
        let mut config = LcdConfig::default();
        config.is_local_capabilities_directory_persistency_enabled = true;
        config.locals_persistence_path = Some(path.clone());

        let lcd = LocalCapabilitiesDirectory::new(
            "cc-1",
            Arc::new(InMemoryGcdClient::new()),
            test_router(),
            KnownGbids::new(vec!["gbid-a".into()], "gbid-a"),
            None,
            config.clone(),
        );
        lcd.add(entry("P1", ProviderScope::Local), true, vec![]).await.unwrap();

        let restarted = LocalCapabilitiesDirectory::new(
            "cc-1",
            Arc::new(InMemoryGcdClient::new()),
            test_router(),
            KnownGbids::new(vec!["gbid-a".into()], "gbid-a"),
            None,
            config,
        );
        assert!(restarted.store.contains_local("P1"));
    }

    #[tokio::test]
    async fn disabled_persistency_does_not_write_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locals.json");
        let mut config = LcdConfig::default();
        config.is_local_capabilities_directory_persistency_enabled = false;
        config.locals_persistence_path = Some(path.clone());

        let lcd = LocalCapabilitiesDirectory::new(
            "cc-1",
            Arc::new(InMemoryGcdClient::new()),
            test_router(),
            KnownGbids::new(vec!["gbid-a".into()], "gbid-a"),
            None,
            config,
        );
        lcd.add(entry("P1", ProviderScope::Local), true, vec![]).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn remove_clears_router_and_store() {
        let lcd = test_lcd();
        lcd.router
            .add_next_hop("P1", Address::mqtt("tcp://b", "t"), true, i64::MAX, false)
            .await;
        lcd.add(entry("P1", ProviderScope::Global), true, vec!["gbid-a".into()])
            .await
            .unwrap();
        lcd.remove("P1").await.unwrap();
        assert!(!lcd.router.resolve_next_hop("P1").await);
        let err = lcd
            .lookup_by_participant_id("P1", qos(DiscoveryScope::LocalThenGlobal), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::NoEntryForParticipant { .. }));
    }
}
