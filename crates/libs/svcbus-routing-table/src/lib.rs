//! Participant-id indexed routing table.
//!
//! This is a plain value type — it holds no lock of its own. The router
//! wraps it in a `RwLock` and is responsible for the lock-acquisition order
//! documented in the router crate.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use svcbus_address::Address;

/// A single routing-table record. At most one exists per `participant_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub participant_id: String,
    pub address: Address,
    pub is_globally_visible: bool,
    pub expiry_date_ms: i64,
    /// A sticky entry is immune to purge and can never be replaced by a
    /// non-sticky one.
    pub is_sticky: bool,
}

impl RoutingEntry {
    pub fn new(
        participant_id: impl Into<String>,
        address: Address,
        is_globally_visible: bool,
        expiry_date_ms: i64,
        is_sticky: bool,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            address,
            is_globally_visible,
            expiry_date_ms,
            is_sticky,
        }
    }
}

/// Outcome of [`RoutingTable::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A fresh entry was inserted.
    Inserted,
    /// An existing entry was replaced (address or visibility changed, or
    /// neither changed but expiry/stickiness were refreshed).
    Replaced,
    /// Rejected: the existing entry is sticky and the new address differs.
    RejectedSticky,
}

#[derive(Default)]
pub struct RoutingTable {
    by_participant: HashMap<String, RoutingEntry>,
    by_address: HashMap<Address, HashSet<String>>,
    by_expiry: BTreeMap<i64, HashSet<String>>,
    /// The participant id of the global capabilities directory proxy. It is
    /// addressed per-GBID rather than by a single address, since each
    /// backend's directory instance is reachable over its own channel.
    gcd_participant_id: Option<String>,
    gcd_addresses_by_gbid: HashMap<String, Address>,
}

impl RoutingTable {
    pub fn new(gcd_participant_id: impl Into<Option<String>>) -> Self {
        Self {
            gcd_participant_id: gcd_participant_id.into(),
            ..Default::default()
        }
    }

    /// Registers the address through which the global directory is reached
    /// for one backend. Looked up via [`RoutingTable::lookup_by_participant_id_and_gbid`].
    pub fn add_gcd_address(&mut self, gbid: impl Into<String>, address: Address) {
        self.gcd_addresses_by_gbid.insert(gbid.into(), address);
    }

    pub fn lookup_by_participant_id(&self, participant_id: &str) -> Option<&RoutingEntry> {
        self.by_participant.get(participant_id)
    }

    pub fn lookup_by_participant_id_and_gbid(
        &self,
        participant_id: &str,
        gbid: &str,
    ) -> Option<RoutingEntryRef<'_>> {
        if self.gcd_participant_id.as_deref() == Some(participant_id) {
            return self
                .gcd_addresses_by_gbid
                .get(gbid)
                .map(RoutingEntryRef::GcdAddress);
        }
        self.by_participant
            .get(participant_id)
            .map(RoutingEntryRef::Entry)
    }

    pub fn contains_participant_id(&self, participant_id: &str) -> bool {
        self.by_participant.contains_key(participant_id)
    }

    pub fn lookup_participant_ids_by_address(&self, address: &Address) -> HashSet<String> {
        self.by_address
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    /// Inserts or replaces the entry for `participant_id`, enforcing the
    /// sticky-entry invariants: a sticky entry is never replaced by a
    /// non-sticky one, and its expiry never decreases.
    pub fn add(
        &mut self,
        participant_id: impl Into<String>,
        address: Address,
        is_globally_visible: bool,
        expiry_date_ms: i64,
        is_sticky: bool,
    ) -> AddOutcome {
        let participant_id = participant_id.into();
        if let Some(existing) = self.by_participant.get(&participant_id) {
            let address_changed = existing.address != address;
            if address_changed && existing.is_sticky {
                log::warn!(
                    "refusing to update participantId={participant_id} in routing table: \
                     existing entry is sticky"
                );
                return AddOutcome::RejectedSticky;
            }
            let merged_expiry = existing.expiry_date_ms.max(expiry_date_ms);
            let merged_sticky = existing.is_sticky || is_sticky;
            self.remove_from_secondary_indexes(&participant_id);
            let entry = RoutingEntry::new(
                participant_id.clone(),
                address,
                is_globally_visible,
                merged_expiry,
                merged_sticky,
            );
            self.insert_into_secondary_indexes(&entry);
            self.by_participant.insert(participant_id, entry);
            AddOutcome::Replaced
        } else {
            let entry = RoutingEntry::new(
                participant_id.clone(),
                address,
                is_globally_visible,
                expiry_date_ms,
                is_sticky,
            );
            self.insert_into_secondary_indexes(&entry);
            self.by_participant.insert(participant_id, entry);
            AddOutcome::Inserted
        }
    }

    pub fn remove(&mut self, participant_id: &str) -> Option<RoutingEntry> {
        let entry = self.by_participant.remove(participant_id)?;
        self.remove_from_secondary_indexes(participant_id);
        Some(entry)
    }

    /// Removes entries whose `expiry_date_ms < now_ms` and are not sticky.
    /// Returns the removed entries.
    pub fn purge(&mut self, now_ms: i64) -> Vec<RoutingEntry> {
        let expired_ids: Vec<String> = self
            .by_expiry
            .range(..now_ms)
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect();
        let mut removed = Vec::new();
        for id in expired_ids {
            if let Some(entry) = self.by_participant.get(&id) {
                if entry.is_sticky {
                    continue;
                }
            } else {
                continue;
            }
            if let Some(entry) = self.remove(&id) {
                removed.push(entry);
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.by_participant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_participant.is_empty()
    }

    /// All entries eligible for persistence (InProcess entries are excluded
    /// by the caller's serializer, but filtering here too keeps the
    /// invariant visible at the type that owns it).
    pub fn persistable_entries(&self) -> impl Iterator<Item = &RoutingEntry> {
        self.by_participant
            .values()
            .filter(|entry| !entry.address.is_in_process())
    }

    /// Merges entries loaded from a persistence file into the in-memory
    /// table, as if each had been `add`ed.
    pub fn merge_loaded(&mut self, entries: Vec<RoutingEntry>) {
        for entry in entries {
            self.add(
                entry.participant_id,
                entry.address,
                entry.is_globally_visible,
                entry.expiry_date_ms,
                entry.is_sticky,
            );
        }
    }

    fn insert_into_secondary_indexes(&mut self, entry: &RoutingEntry) {
        self.by_address
            .entry(entry.address.clone())
            .or_default()
            .insert(entry.participant_id.clone());
        self.by_expiry
            .entry(entry.expiry_date_ms)
            .or_default()
            .insert(entry.participant_id.clone());
    }

    fn remove_from_secondary_indexes(&mut self, participant_id: &str) {
        let Some(entry) = self.by_participant.get(participant_id) else {
            return;
        };
        if let Some(ids) = self.by_address.get_mut(&entry.address) {
            ids.remove(participant_id);
            if ids.is_empty() {
                self.by_address.remove(&entry.address);
            }
        }
        if let Some(ids) = self.by_expiry.get_mut(&entry.expiry_date_ms) {
            ids.remove(participant_id);
            if ids.is_empty() {
                self.by_expiry.remove(&entry.expiry_date_ms);
            }
        }
    }
}

/// Result of a participant+gbid lookup: either a full routing entry, or —
/// for the global-directory's own participant id — a bare address scoped to
/// the requested backend.
pub enum RoutingEntryRef<'a> {
    Entry(&'a RoutingEntry),
    GcdAddress(&'a Address),
}

impl RoutingEntryRef<'_> {
    pub fn address(&self) -> &Address {
        match self {
            RoutingEntryRef::Entry(entry) => &entry.address,
            RoutingEntryRef::GcdAddress(address) => address,
        }
    }
}
