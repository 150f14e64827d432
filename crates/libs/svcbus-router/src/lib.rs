//! The message router: composes the routing table, multicast receiver
//! directory, retry/transport-not-available queues, stub factory, multicast
//! address calculator, and delayed scheduler into a single concurrent,
//! back-pressured dispatcher.
//!
//! Cyclic ownership between the router and its own send tasks is broken
//! with a weak/strong split: [`Router`] is always
//! handed out as `Arc<Router>`, and every task the router spawns onto its
//! [`svcbus_scheduler::DelayedScheduler`] closes over a `Weak<Router>` rather
//! than a strong one — a task whose router has already been dropped just
//! skips its work instead of keeping the whole graph alive.

mod backoff;
mod error;
mod persistence;
mod stats;
mod transport_queue;

pub use backoff::compute_backoff;
pub use error::RoutingError;
pub use stats::{RouterStats, RouterStatsSnapshot};
pub use transport_queue::{ParkedMessage, TransportNotAvailableQueue};

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use svcbus_address::Address;
use svcbus_message::{now_ms, Message};
use svcbus_message_queue::DestinationQueue;
use svcbus_multicast::MulticastReceiverDirectory;
use svcbus_routing_table::{AddOutcome, RoutingEntry, RoutingTable};
use svcbus_scheduler::DelayedScheduler;
use svcbus_transport::{
    MessagingStubFactory, MulticastAddressCalculator, MulticastSkeletonFactory, TransmitError,
    TransportStatus,
};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Tunables this crate owns from the cluster controller's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub send_msg_retry_interval_ms: u64,
    pub max_acl_retry_interval_ms: u64,
    pub message_queue_cleaner_period_ms: u64,
    pub routing_table_cleanup_interval_ms: u64,
    pub scheduler_capacity: usize,
    pub persist_routing_table: bool,
    /// Where `persist_routing_table` saves to and loads from. Inert if
    /// `persist_routing_table` is false or this is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_table_persistence_path: Option<std::path::PathBuf>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            send_msg_retry_interval_ms: 1_000,
            max_acl_retry_interval_ms: 3_600_000,
            message_queue_cleaner_period_ms: 1_000,
            routing_table_cleanup_interval_ms: 60_000,
            scheduler_capacity: 1,
            persist_routing_table: false,
            routing_table_persistence_path: None,
        }
    }
}

/// Composition of every external collaborator the router needs, supplied at
/// construction. Concrete transports, the multicast address calculator, and
/// any skeleton factory are external collaborators — this
/// crate only defines the traits they implement, in `svcbus-transport`.
pub struct Router {
    routing_table: RwLock<RoutingTable>,
    multicast_directory: MulticastReceiverDirectory,
    retry_queue: DestinationQueue,
    transport_not_available_queue: TransportNotAvailableQueue,
    transport_statuses: SyncMutex<Vec<Arc<dyn TransportStatus>>>,
    stub_factory: Arc<dyn MessagingStubFactory>,
    multicast_calculator: Arc<dyn MulticastAddressCalculator>,
    skeleton_factory: Option<Arc<dyn MulticastSkeletonFactory>>,
    scheduler: DelayedScheduler,
    config: RouterConfig,
    stats: RouterStats,
    maintenance_handles: SyncMutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
    self_weak: Weak<Router>,
}

impl Router {
    pub fn new(
        gcd_participant_id: impl Into<Option<String>>,
        stub_factory: Arc<dyn MessagingStubFactory>,
        multicast_calculator: Arc<dyn MulticastAddressCalculator>,
        skeleton_factory: Option<Arc<dyn MulticastSkeletonFactory>>,
        transport_statuses: Vec<Arc<dyn TransportStatus>>,
        config: RouterConfig,
    ) -> Arc<Self> {
        let scheduler_capacity = config.scheduler_capacity;
        let mut routing_table = RoutingTable::new(gcd_participant_id);
        if config.persist_routing_table {
            if let Some(path) = &config.routing_table_persistence_path {
                if let Some(document) = persistence::load(path) {
                    routing_table.merge_loaded(document.entries);
                }
            }
        }
        Arc::new_cyclic(|weak| Router {
            routing_table: RwLock::new(routing_table),
            multicast_directory: MulticastReceiverDirectory::new(),
            retry_queue: DestinationQueue::new(),
            transport_not_available_queue: TransportNotAvailableQueue::new(),
            transport_statuses: SyncMutex::new(transport_statuses),
            stub_factory,
            multicast_calculator,
            skeleton_factory,
            scheduler: DelayedScheduler::new(scheduler_capacity),
            config,
            stats: RouterStats::default(),
            maintenance_handles: SyncMutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            self_weak: weak.clone(),
        })
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn register_gcd_address(&self, gbid: impl Into<String>, address: Address) {
        self.routing_table.write().await.add_gcd_address(gbid, address);
    }

    /// Resolves destinations and dispatches or queues a message. Fails
    /// synchronously only when the message is already expired; every other
    /// unresolved case (unknown unicast destination, transport down) is
    /// handled internally by queueing.
    pub async fn route(&self, message: Message, try_count: u32) -> Result<(), RoutingError> {
        let now = now_ms();
        if message.is_expired_at(now) {
            return Err(RoutingError::Expired {
                message_id: message.id.clone(),
                now_ms: now,
                expiry_ms: message.expiry_date_ms,
            });
        }
        self.stats.record_routed();

        let table = self.routing_table.read().await;
        let destinations = if message.msg_type.is_multicast() {
            self.multicast_destinations(&table, &message)
        } else {
            self.unicast_destination(&table, &message).into_iter().collect()
        };

        if destinations.is_empty() {
            if message.msg_type.is_multicast() {
                log::debug!("dropping multicast {}: no destinations", message.tracking_info());
                self.stats.record_dropped();
            } else {
                log::debug!("queueing {}: no route yet", message.tracking_info());
                self.retry_queue.enqueue(message.recipient.clone(), message, now);
                self.stats.record_queued();
            }
            return Ok(());
        }
        drop(table);

        for address in destinations {
            self.schedule(message.clone(), address, try_count, Duration::ZERO).await;
        }
        Ok(())
    }

    fn unicast_destination(&self, table: &RoutingTable, message: &Message) -> Option<Address> {
        if let Some(gbid) = message.gbid_header() {
            table
                .lookup_by_participant_id_and_gbid(&message.recipient, gbid)
                .map(|entry_ref| entry_ref.address().clone())
        } else {
            table
                .lookup_by_participant_id(&message.recipient)
                .map(|entry| entry.address.clone())
        }
    }

    fn multicast_destinations(&self, table: &RoutingTable, message: &Message) -> Vec<Address> {
        let mut destinations = Vec::new();
        for subscriber_id in self.multicast_directory.get_receivers(&message.recipient) {
            if let Some(entry) = table.lookup_by_participant_id(&subscriber_id) {
                destinations.push(entry.address.clone());
            }
        }
        if !message.received_from_global {
            let sender_is_global_provider = table
                .lookup_by_participant_id(&message.sender)
                .is_some_and(|entry| entry.is_globally_visible);
            if sender_is_global_provider {
                destinations.extend(self.multicast_calculator.calculate(message));
            }
        }
        destinations
    }

    /// Inserts or replaces a next-hop (see [`RoutingTable::add`]'s
    /// invariants). On success, drains any messages queued for
    /// `participant_id` and re-schedules them against the new address.
    /// Returns `false` if the existing entry was sticky and the address
    /// differs (refused).
    pub async fn add_next_hop(
        &self,
        participant_id: impl Into<String>,
        address: Address,
        is_globally_visible: bool,
        expiry_date_ms: i64,
        is_sticky: bool,
    ) -> bool {
        let participant_id = participant_id.into();
        let outcome = {
            let mut table = self.routing_table.write().await;
            table.add(
                participant_id.clone(),
                address.clone(),
                is_globally_visible,
                expiry_date_ms,
                is_sticky,
            )
        };
        if outcome == AddOutcome::RejectedSticky {
            return false;
        }

        self.persist_routing_table_if_enabled().await;

        let queued = self.retry_queue.drain(&participant_id);
        for entry in queued {
            self.schedule(entry.message, address.clone(), 0, Duration::ZERO).await;
        }
        true
    }

    pub async fn remove_next_hop(&self, participant_id: &str) -> Option<RoutingEntry> {
        let removed = self.routing_table.write().await.remove(participant_id);
        if removed.is_some() {
            self.persist_routing_table_if_enabled().await;
        }
        removed
    }

    /// Writes the routing table to `routing_table_persistence_path` when
    /// `persist_routing_table` and a path are both configured. Failures are
    /// logged, not propagated — a mutation that already landed in memory
    /// should not fail the caller because the disk write did not keep up.
    async fn persist_routing_table_if_enabled(&self) {
        if !self.config.persist_routing_table {
            return;
        }
        let Some(path) = self.config.routing_table_persistence_path.clone() else {
            return;
        };
        if let Err(err) = self.save_routing_table(&path).await {
            log::warn!("failed to persist routing table to {}: {err}", path.display());
        }
    }

    pub async fn resolve_next_hop(&self, participant_id: &str) -> bool {
        self.routing_table.read().await.contains_participant_id(participant_id)
    }

    /// The transport address currently on file for `participant_id`, if
    /// any. Used by the capabilities directory to recover a locally
    /// registered provider's own address when advertising it globally.
    pub async fn lookup_next_hop_address(&self, participant_id: &str) -> Option<Address> {
        self.routing_table
            .read()
            .await
            .lookup_by_participant_id(participant_id)
            .map(|entry| entry.address.clone())
    }

    pub async fn add_multicast_receiver(
        &self,
        multicast_id: &str,
        subscriber_participant_id: impl Into<String>,
        provider_participant_id: &str,
    ) -> Result<(), RoutingError> {
        self.multicast_directory
            .register(multicast_id, subscriber_participant_id)?;

        let provider_address = self
            .routing_table
            .read()
            .await
            .lookup_by_participant_id(provider_participant_id)
            .map(|entry| entry.address.clone())
            .ok_or_else(|| {
                RoutingError::ProviderRuntime(format!(
                    "no route for multicast provider {provider_participant_id}"
                ))
            })?;

        if let Some(skeleton) = self.skeleton_for(&provider_address) {
            skeleton.register_multicast_subscription(multicast_id);
        }
        Ok(())
    }

    pub async fn remove_multicast_receiver(
        &self,
        multicast_id: &str,
        subscriber_participant_id: &str,
        provider_participant_id: &str,
    ) -> Result<(), RoutingError> {
        let removed = self
            .multicast_directory
            .unregister(multicast_id, subscriber_participant_id);
        if !removed {
            return Ok(());
        }
        if self.multicast_directory.contains_pattern(multicast_id) {
            return Ok(());
        }

        let provider_address = self
            .routing_table
            .read()
            .await
            .lookup_by_participant_id(provider_participant_id)
            .map(|entry| entry.address.clone());
        if let Some(address) = provider_address {
            if let Some(skeleton) = self.skeleton_for(&address) {
                skeleton.unregister_multicast_subscription(multicast_id);
            }
        }
        Ok(())
    }

    fn skeleton_for(
        &self,
        address: &Address,
    ) -> Option<Arc<dyn svcbus_transport::MulticastSubscriptionSkeleton>> {
        self.skeleton_factory
            .as_ref()
            .and_then(|factory| factory.skeleton_for(address))
    }

    /// `schedule`: transport-availability gate, then stub creation,
    /// then submission to the delayed scheduler.
    async fn schedule(&self, message: Message, dest_address: Address, try_count: u32, delay: Duration) {
        let responsible_unavailable = {
            let statuses = self.transport_statuses.lock();
            statuses
                .iter()
                .find(|status| status.is_responsible_for(&dest_address))
                .filter(|status| !status.is_available())
                .map(|status| status.transport_id().to_string())
        };
        if let Some(transport_id) = responsible_unavailable {
            log::debug!(
                "transport {transport_id} unavailable, parking {}",
                message.tracking_info()
            );
            self.transport_not_available_queue
                .enqueue(&transport_id, message, dest_address, try_count);
            self.stats.record_queued();
            return;
        }

        let Some(stub) = self.stub_factory.create(&dest_address) else {
            if message.msg_type.is_multicast() || message.msg_type.is_publication() {
                log::warn!("no stub for {}; dropping", message.tracking_info());
                self.stats.record_dropped();
            } else {
                log::debug!("no stub for {} yet; queueing for retry", message.tracking_info());
                self.retry_queue.enqueue(message.recipient.clone(), message, now_ms());
                self.stats.record_queued();
            }
            return;
        };

        let weak = self.self_weak.clone();
        let task_message = message;
        let task_address = dest_address;
        let submit = self
            .scheduler
            .schedule(delay, async move {
                let Some(router) = weak.upgrade() else {
                    return;
                };
                router.run_send_task(task_message, stub, task_address, try_count).await;
            })
            .await;
        if let Err(err) = submit {
            log::warn!("router is shutting down, dropping send task: {err}");
        }
    }

    async fn run_send_task(
        &self,
        message: Message,
        stub: Box<dyn svcbus_transport::MessagingStub>,
        dest_address: Address,
        try_count: u32,
    ) {
        let now = now_ms();
        if message.is_expired_at(now) {
            log::debug!("dropping expired {} before transmit", message.tracking_info());
            self.stats.record_dropped();
            return;
        }
        match stub.transmit(&message).await {
            Ok(()) => {
                self.stats.record_transmitted();
            }
            Err(TransmitError::Delay { delay_ms, reason }) => {
                log::debug!(
                    "transient failure for {} ({reason}); retrying in {delay_ms}ms",
                    message.tracking_info()
                );
                let backoff_ms =
                    compute_backoff(self.config.send_msg_retry_interval_ms, try_count + 1, self.config.max_acl_retry_interval_ms)
                        .max(delay_ms);
                self.schedule(message, dest_address, try_count + 1, Duration::from_millis(backoff_ms))
                    .await;
            }
            Err(TransmitError::Permanent(reason)) => {
                log::warn!("permanent failure for {}: {reason}", message.tracking_info());
                self.stats.record_dropped();
            }
        }
    }

    /// Called when a transport status flips from unavailable to available:
    /// drains its parked messages and routes each anew.
    pub async fn on_transport_available(&self, transport_id: &str) {
        for parked in self.transport_not_available_queue.drain(transport_id) {
            self.schedule(parked.message, parked.dest_address, parked.try_count, Duration::ZERO)
                .await;
        }
    }

    /// Queue cleaner maintenance tick: sweeps both queues and logs
    /// the routed-message count.
    pub fn sweep_expired_queues(&self) {
        let retry_removed = self.retry_queue.sweep_expired(now_ms());
        let parked_removed = self.transport_not_available_queue.sweep_expired(now_ms());
        if retry_removed > 0 || parked_removed > 0 {
            log::debug!(
                "queue cleaner: removed {retry_removed} expired retry + {parked_removed} expired parked messages"
            );
        }
        log::info!("routed message count: {}", self.stats.snapshot().routed);
    }

    pub async fn purge_routing_table(&self) -> Vec<RoutingEntry> {
        self.routing_table.write().await.purge(now_ms())
    }

    /// Spawns the queue-cleaner and routing-table-cleaner maintenance loops
    /// onto the Tokio runtime. Idempotent only in the sense that calling it
    /// twice spawns a second set of loops — callers should call it once.
    pub fn start_maintenance(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let queue_period = Duration::from_millis(self.config.message_queue_cleaner_period_ms);
        let queue_cleaner = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(queue_period);
            loop {
                ticker.tick().await;
                let Some(router) = weak.upgrade() else { break };
                router.sweep_expired_queues();
            }
        });

        let weak = Arc::downgrade(self);
        let table_period = Duration::from_millis(self.config.routing_table_cleanup_interval_ms);
        let table_cleaner = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(table_period);
            loop {
                ticker.tick().await;
                let Some(router) = weak.upgrade() else { break };
                let removed = router.purge_routing_table().await;
                if !removed.is_empty() {
                    log::debug!("routing table cleaner: purged {} expired entries", removed.len());
                }
            }
        });

        self.maintenance_handles.lock().push(queue_cleaner);
        self.maintenance_handles.lock().push(table_cleaner);
    }

    pub async fn save_routing_table(&self, path: &Path) -> std::io::Result<()> {
        let table = self.routing_table.read().await;
        let entries: Vec<RoutingEntry> = table.persistable_entries().cloned().collect();
        drop(table);
        persistence::save(path, entries)
    }

    pub async fn load_routing_table(&self, path: &Path) {
        if let Some(document) = persistence::load(path) {
            self.routing_table.write().await.merge_loaded(document.entries);
        }
    }

    /// Cancels maintenance timers, drains the scheduler, and marks the
    /// router shut down. Best-effort — operations attempted afterward are
    /// not actively rejected (there is no in-flight `route` call to reject),
    /// but `Drop` will warn if this was never called.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        for handle in self.maintenance_handles.lock().drain(..) {
            handle.abort();
        }
        self.scheduler.shutdown().await;
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        if !self.shut_down.load(Ordering::SeqCst) {
            log::warn!("Router dropped without calling shutdown()");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use svcbus_message::MessageType;

    struct NoopCalculator;
    impl MulticastAddressCalculator for NoopCalculator {
        fn calculate(&self, _message: &Message) -> Vec<Address> {
            Vec::new()
        }
    }

    struct RecordingStub {
        transmitted: Arc<Mutex<Vec<Message>>>,
    }

    #[async_trait]
    impl svcbus_transport::MessagingStub for RecordingStub {
        async fn transmit(&self, message: &Message) -> Result<(), TransmitError> {
            self.transmitted.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct RecordingStubFactory {
        transmitted: Arc<Mutex<Vec<Message>>>,
        deny: Arc<AtomicUsize>,
    }

    impl MessagingStubFactory for RecordingStubFactory {
        fn create(&self, _address: &Address) -> Option<Box<dyn svcbus_transport::MessagingStub>> {
            if self.deny.load(Ordering::SeqCst) > 0 {
                self.deny.fetch_sub(1, Ordering::SeqCst);
                return None;
            }
            Some(Box::new(RecordingStub {
                transmitted: self.transmitted.clone(),
            }))
        }
    }

    fn test_router() -> (Arc<Router>, Arc<Mutex<Vec<Message>>>) {
        let transmitted = Arc::new(Mutex::new(Vec::new()));
        let factory = Arc::new(RecordingStubFactory {
            transmitted: transmitted.clone(),
            deny: Arc::new(AtomicUsize::new(0)),
        });
        let router = Router::new(
            None,
            factory,
            Arc::new(NoopCalculator),
            None,
            Vec::new(),
            RouterConfig::default(),
        );
        (router, transmitted)
    }

    fn msg(id: &str, recipient: &str, msg_type: MessageType) -> Message {
        Message::new(id, msg_type, "sender", recipient, i64::MAX)
    }

    #[tokio::test]
    async fn unknown_unicast_destination_is_queued_then_delivered_on_add_next_hop() {
        let (router, transmitted) = test_router();
        router
            .route(msg("m1", "P", MessageType::OneWay), 0)
            .await
            .unwrap();
        assert!(transmitted.lock().unwrap().is_empty());

        let ok = router
            .add_next_hop("P", Address::mqtt("b", "t"), false, i64::MAX, false)
            .await;
        assert!(ok);

        assert_eq!(transmitted.lock().unwrap().len(), 1);
        assert_eq!(transmitted.lock().unwrap()[0].id, "m1");
        assert!(!router.retry_queue.contains_key("P"));
    }

    #[tokio::test]
    async fn expired_message_is_rejected_synchronously() {
        let (router, transmitted) = test_router();
        let expired = Message::new("m1", MessageType::OneWay, "s", "P", 0);
        let result = router.route(expired, 0).await;
        assert!(matches!(result, Err(RoutingError::Expired { .. })));
        assert!(transmitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sticky_entry_rejects_replacement_by_different_address() {
        let (router, _transmitted) = test_router();
        let a1 = Address::mqtt("b", "t1");
        let a2 = Address::mqtt("b", "t2");
        assert!(router.add_next_hop("P", a1.clone(), false, i64::MAX, true).await);
        assert!(!router.add_next_hop("P", a2, false, 500, false).await);
        assert!(router.resolve_next_hop("P").await);
    }

    #[tokio::test]
    async fn multicast_never_enqueues_when_unresolved() {
        let (router, _transmitted) = test_router();
        router
            .route(msg("m1", "prov/topic", MessageType::Multicast), 0)
            .await
            .unwrap();
        assert!(router.retry_queue.is_empty());
        assert_eq!(router.stats().dropped, 1);
    }

    #[tokio::test]
    async fn multicast_fans_out_to_matching_local_subscribers() {
        let (router, transmitted) = test_router();
        router
            .add_next_hop("R1", Address::mqtt("b", "r1"), false, i64::MAX, false)
            .await;
        router
            .add_multicast_receiver("prov/brod/+", "R1", "R1")
            .await
            .unwrap();
        router
            .route(msg("m1", "prov/brod/a", MessageType::Multicast), 0)
            .await
            .unwrap();
        assert_eq!(transmitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn backoff_cap_is_respected_by_config() {
        assert_eq!(compute_backoff(1_000, 5, 3_600_000), 32_000);
    }

    #[tokio::test]
    async fn shutdown_can_be_awaited() {
        let (router, _t) = test_router();
        router.shutdown().await;
    }

    #[tokio::test]
    async fn persist_routing_table_flag_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing.json");
        let config = RouterConfig {
            persist_routing_table: true,
            routing_table_persistence_path: Some(path.clone()),
            ..RouterConfig::default()
        };

        let router = Router::new(
            None,
            Arc::new(RecordingStubFactory {
                transmitted: Arc::new(Mutex::new(Vec::new())),
                deny: Arc::new(AtomicUsize::new(0)),
            }),
            Arc::new(NoopCalculator),
            None,
            Vec::new(),
            config.clone(),
        );
        router
            .add_next_hop("P", Address::mqtt("b", "t"), false, i64::MAX, false)
            .await;
        assert!(path.exists());

        let restarted = Router::new(
            None,
            Arc::new(RecordingStubFactory {
                transmitted: Arc::new(Mutex::new(Vec::new())),
                deny: Arc::new(AtomicUsize::new(0)),
            }),
            Arc::new(NoopCalculator),
            None,
            Vec::new(),
            config,
        );
        assert!(restarted.resolve_next_hop("P").await);
    }

    #[tokio::test]
    async fn persist_routing_table_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing.json");
        let config = RouterConfig {
            persist_routing_table: false,
            routing_table_persistence_path: Some(path.clone()),
            ..RouterConfig::default()
        };
        let (router, _t) = {
            let transmitted = Arc::new(Mutex::new(Vec::new()));
            let factory = Arc::new(RecordingStubFactory {
                transmitted: transmitted.clone(),
                deny: Arc::new(AtomicUsize::new(0)),
            });
            let router = Router::new(None, factory, Arc::new(NoopCalculator), None, Vec::new(), config);
            (router, transmitted)
        };
        router
            .add_next_hop("P", Address::mqtt("b", "t"), false, i64::MAX, false)
            .await;
        assert!(!path.exists());
    }
}
