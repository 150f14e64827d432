//! Local Capabilities Directory store: the locally registered provider set
//! plus an LRU+TTL cache of entries learned from the global directory.
//!
//! Both sub-stores and the participant→GBIDs mapping live behind one lock,
//! mirroring a single recursive mutex design. Rust mutexes aren't
//! reentrant, so every operation that needs to call another is split into a
//! public entry point (`lock()` once) and a private `_locked` helper that
//! takes the already-held guard.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use svcbus_discovery_types::{
    DiscoveryEntry, DiscoveryEntryWithMetaInfo, DiscoveryQos, DiscoveryScope, ProviderScope,
};

const DEFAULT_GLOBAL_CACHE_CAPACITY: usize = 1000;

/// Outcome of a scoped lookup: `Deferred` means the caller must consult the
/// remote directory; the store could not answer synchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome<T> {
    Answered(T),
    Deferred,
}

impl<T> LookupOutcome<T> {
    pub fn is_deferred(&self) -> bool {
        matches!(self, LookupOutcome::Deferred)
    }
}

struct CachedEntry {
    entry: DiscoveryEntry,
    inserted_at_ms: i64,
}

struct Inner {
    locally_registered: HashMap<String, DiscoveryEntry>,
    global_cache: LruCache<String, CachedEntry>,
    participant_to_gbids: HashMap<String, Vec<String>>,
}

impl Inner {
    fn local_matches(&self, domain: &str, interface_name: &str) -> Vec<DiscoveryEntry> {
        self.locally_registered
            .values()
            .filter(|entry| entry.matches_domain_interface(domain, interface_name))
            .cloned()
            .collect()
    }

    fn cached_matches(
        &self,
        domain: &str,
        interface_name: &str,
        qos: &DiscoveryQos,
        gbids: &[String],
        now_ms: i64,
    ) -> Vec<DiscoveryEntry> {
        self.global_cache
            .iter()
            .filter(|(participant_id, cached)| {
                cached.entry.matches_domain_interface(domain, interface_name)
                    && self.gbids_overlap(participant_id, gbids)
                    && self.within_cache_age(cached, qos, now_ms)
            })
            .map(|(_, cached)| cached.entry.clone())
            .collect()
    }

    fn gbids_overlap(&self, participant_id: &str, gbids: &[String]) -> bool {
        if gbids.is_empty() {
            return true;
        }
        self.participant_to_gbids
            .get(participant_id)
            .is_some_and(|known| known.iter().any(|g| gbids.contains(g)))
    }

    fn within_cache_age(&self, cached: &CachedEntry, qos: &DiscoveryQos, now_ms: i64) -> bool {
        if !qos.cache_age_filter_enabled() {
            return true;
        }
        now_ms - cached.inserted_at_ms <= qos.cache_max_age_ms
    }

    /// Union of local and cached-global matches, local entries taking
    /// precedence on duplicate `participant_id`.
    fn merge_preferring_local(
        local: Vec<DiscoveryEntry>,
        cached: Vec<DiscoveryEntry>,
    ) -> Vec<DiscoveryEntryWithMetaInfo> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut merged = Vec::with_capacity(local.len() + cached.len());
        for entry in local {
            seen.insert(entry.participant_id.clone());
            merged.push(DiscoveryEntryWithMetaInfo::local(entry));
        }
        for entry in cached {
            if seen.insert(entry.participant_id.clone()) {
                merged.push(DiscoveryEntryWithMetaInfo::cached(entry));
            }
        }
        merged
    }
}

pub struct LcdStore {
    inner: Mutex<Inner>,
}

impl Default for LcdStore {
    fn default() -> Self {
        Self::new(DEFAULT_GLOBAL_CACHE_CAPACITY)
    }
}

impl LcdStore {
    pub fn new(global_cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(global_cache_capacity.max(1)).expect("capacity > 0");
        Self {
            inner: Mutex::new(Inner {
                locally_registered: HashMap::new(),
                global_cache: LruCache::new(capacity),
                participant_to_gbids: HashMap::new(),
            }),
        }
    }

    /// Replaces any prior entry with the same `participantId`. The
    /// participant→GBIDs mapping is left untouched either way — it's owned
    /// by the global-insert path.
    pub fn insert_local(&self, entry: DiscoveryEntry) {
        let mut inner = self.inner.lock();
        log::debug!("insertLocal participantId={}", entry.participant_id);
        inner.locally_registered.insert(entry.participant_id.clone(), entry);
    }

    /// Inserts into the LRU cache (evicting the least-recently-used entry on
    /// overflow) and unions `gbids` into the participant's known backends.
    pub fn insert_global(&self, entry: DiscoveryEntry, gbids: Vec<String>, now_ms: i64) {
        let mut inner = self.inner.lock();
        let participant_id = entry.participant_id.clone();
        inner.global_cache.put(
            participant_id.clone(),
            CachedEntry {
                entry,
                inserted_at_ms: now_ms,
            },
        );
        let known = inner.participant_to_gbids.entry(participant_id).or_default();
        for gbid in gbids {
            if !known.contains(&gbid) {
                known.push(gbid);
            }
        }
    }

    /// Scoped lookup by (domain, interfaceName).
    pub fn lookup_by_domain_interface(
        &self,
        domain: &str,
        interface_name: &str,
        qos: &DiscoveryQos,
        gbids: &[String],
        now_ms: i64,
    ) -> LookupOutcome<Vec<DiscoveryEntryWithMetaInfo>> {
        let inner = self.inner.lock();
        let local = inner.local_matches(domain, interface_name);
        match qos.discovery_scope {
            DiscoveryScope::LocalOnly => LookupOutcome::Answered(
                local.into_iter().map(DiscoveryEntryWithMetaInfo::local).collect(),
            ),
            DiscoveryScope::LocalThenGlobal => {
                if !local.is_empty() {
                    return LookupOutcome::Answered(
                        local.into_iter().map(DiscoveryEntryWithMetaInfo::local).collect(),
                    );
                }
                let cached = inner.cached_matches(domain, interface_name, qos, gbids, now_ms);
                if cached.is_empty() {
                    LookupOutcome::Deferred
                } else {
                    LookupOutcome::Answered(
                        cached.into_iter().map(DiscoveryEntryWithMetaInfo::cached).collect(),
                    )
                }
            }
            DiscoveryScope::LocalAndGlobal => {
                let cached = inner.cached_matches(domain, interface_name, qos, gbids, now_ms);
                if cached.is_empty() {
                    LookupOutcome::Deferred
                } else {
                    LookupOutcome::Answered(Inner::merge_preferring_local(local, cached))
                }
            }
            DiscoveryScope::GlobalOnly => {
                let cached = inner.cached_matches(domain, interface_name, qos, gbids, now_ms);
                let local_global_scope: Vec<DiscoveryEntry> = local
                    .into_iter()
                    .filter(|entry| entry.provider_qos.scope == ProviderScope::Global)
                    .collect();
                if cached.is_empty() && local_global_scope.is_empty() {
                    LookupOutcome::Deferred
                } else {
                    LookupOutcome::Answered(Inner::merge_preferring_local(
                        local_global_scope,
                        cached,
                    ))
                }
            }
        }
    }

    /// Scoped lookup by `participantId`, single-entry semantics.
    pub fn lookup_by_participant_id(
        &self,
        participant_id: &str,
        qos: &DiscoveryQos,
        gbids: &[String],
        now_ms: i64,
    ) -> LookupOutcome<Option<DiscoveryEntryWithMetaInfo>> {
        let inner = self.inner.lock();
        let local = inner.locally_registered.get(participant_id).cloned();
        let cached = inner
            .global_cache
            .peek(participant_id)
            .filter(|cached| {
                inner.gbids_overlap(participant_id, gbids) && inner.within_cache_age(cached, qos, now_ms)
            })
            .map(|cached| cached.entry.clone());

        match qos.discovery_scope {
            DiscoveryScope::LocalOnly => {
                LookupOutcome::Answered(local.map(DiscoveryEntryWithMetaInfo::local))
            }
            DiscoveryScope::LocalThenGlobal => {
                if let Some(entry) = local {
                    return LookupOutcome::Answered(Some(DiscoveryEntryWithMetaInfo::local(entry)));
                }
                match cached {
                    Some(entry) => LookupOutcome::Answered(Some(DiscoveryEntryWithMetaInfo::cached(entry))),
                    None => LookupOutcome::Deferred,
                }
            }
            DiscoveryScope::LocalAndGlobal => match cached {
                Some(cached_entry) => LookupOutcome::Answered(Some(
                    local
                        .map(DiscoveryEntryWithMetaInfo::local)
                        .unwrap_or_else(|| DiscoveryEntryWithMetaInfo::cached(cached_entry)),
                )),
                None => LookupOutcome::Deferred,
            },
            DiscoveryScope::GlobalOnly => {
                let local_global = local.filter(|entry| entry.provider_qos.scope == ProviderScope::Global);
                match (local_global, cached) {
                    (Some(entry), _) => LookupOutcome::Answered(Some(DiscoveryEntryWithMetaInfo::local(entry))),
                    (None, Some(entry)) => {
                        LookupOutcome::Answered(Some(DiscoveryEntryWithMetaInfo::cached(entry)))
                    }
                    (None, None) => LookupOutcome::Deferred,
                }
            }
        }
    }

    /// Removes `participant_id` from every sub-store and the gbid mapping.
    pub fn remove_by_participant_id(&self, participant_id: &str) {
        let mut inner = self.inner.lock();
        inner.locally_registered.remove(participant_id);
        inner.global_cache.pop(participant_id);
        inner.participant_to_gbids.remove(participant_id);
    }

    /// Removes expired entries from both sub-stores. Locals with
    /// `expiry_date_ms < now_ms` and cached entries aged out by their own
    /// expiry are dropped; their gbid mapping is cleared only if no
    /// remaining store still references the participant id.
    pub fn purge_expired(&self, now_ms: i64) -> Vec<String> {
        let mut inner = self.inner.lock();
        let expired_locals: Vec<String> = inner
            .locally_registered
            .values()
            .filter(|entry| entry.is_expired_at(now_ms))
            .map(|entry| entry.participant_id.clone())
            .collect();
        for id in &expired_locals {
            inner.locally_registered.remove(id);
        }

        let expired_cached: Vec<String> = inner
            .global_cache
            .iter()
            .filter(|(_, cached)| cached.entry.is_expired_at(now_ms))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired_cached {
            inner.global_cache.pop(id);
        }

        let mut removed: Vec<String> = expired_locals;
        removed.extend(expired_cached);
        removed.sort();
        removed.dedup();
        for id in &removed {
            if !inner.locally_registered.contains_key(id) && inner.global_cache.peek(id).is_none() {
                inner.participant_to_gbids.remove(id);
            }
        }
        removed
    }

    pub fn get_all_global_capabilities(&self) -> Vec<DiscoveryEntry> {
        self.inner
            .lock()
            .global_cache
            .iter()
            .map(|(_, cached)| cached.entry.clone())
            .collect()
    }

    /// Every locally registered entry with GLOBAL scope, for replaying
    /// registrations to the global directory.
    pub fn locally_registered_globals(&self) -> Vec<DiscoveryEntry> {
        self.inner
            .lock()
            .locally_registered
            .values()
            .filter(|entry| entry.provider_qos.scope == ProviderScope::Global)
            .cloned()
            .collect()
    }

    /// Every locally registered entry, LOCAL and GLOBAL scope alike, for
    /// persistence snapshots.
    pub fn all_locals(&self) -> Vec<DiscoveryEntry> {
        self.inner.lock().locally_registered.values().cloned().collect()
    }

    /// Bumps `last_seen_date_ms` to `now_ms` and `expiry_date_ms` to at
    /// least `min_expiry_ms` on every locally registered entry.
    pub fn touch_all_locals(&self, now_ms: i64, min_expiry_ms: i64) {
        let mut inner = self.inner.lock();
        for entry in inner.locally_registered.values_mut() {
            entry.last_seen_date_ms = now_ms;
            if entry.expiry_date_ms < min_expiry_ms {
                entry.expiry_date_ms = min_expiry_ms;
            }
        }
    }

    pub fn gbids_for_participant(&self, participant_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .participant_to_gbids
            .get(participant_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains_local(&self, participant_id: &str) -> bool {
        self.inner.lock().locally_registered.contains_key(participant_id)
    }

    pub fn contains_cached(&self, participant_id: &str) -> bool {
        self.inner.lock().global_cache.peek(participant_id).is_some()
    }
}
