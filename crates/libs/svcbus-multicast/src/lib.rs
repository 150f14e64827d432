//! Multicast id pattern matching (`providerId/segment/segment/...`) and the
//! directory of subscribers registered against compiled patterns.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("'*' is only valid as the final segment of a multicast id pattern: {0}")]
    SuffixNotFinal(String),
    #[error("multicast id pattern must not be empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `+` — exactly one segment.
    Single,
    /// `*` — one or more trailing segments (only valid as the last segment).
    Suffix,
}

/// A compiled multicast id pattern. Equality and hash are on the raw
/// pattern string.
#[derive(Debug, Clone)]
pub struct MulticastMatcher {
    raw: String,
    segments: Vec<Segment>,
}

impl PartialEq for MulticastMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl Eq for MulticastMatcher {}

impl std::hash::Hash for MulticastMatcher {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl MulticastMatcher {
    pub fn compile(pattern: impl Into<String>) -> Result<Self, PatternError> {
        let raw = pattern.into();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }
        let parts: Vec<&str> = raw.split('/').collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let is_last = i == parts.len() - 1;
            let segment = match *part {
                "*" => {
                    if !is_last {
                        return Err(PatternError::SuffixNotFinal(raw));
                    }
                    Segment::Suffix
                }
                "+" => Segment::Single,
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(segment);
        }
        Ok(Self { raw, segments })
    }

    pub fn pattern(&self) -> &str {
        &self.raw
    }

    /// `+` matches exactly one segment; `*` matches one or more trailing
    /// segments (it does not match when the id ends exactly at the literal
    /// prefix preceding it).
    pub fn matches(&self, multicast_id: &str) -> bool {
        let id_segments: Vec<&str> = multicast_id.split('/').collect();
        let mut i = 0usize;
        for segment in &self.segments {
            match segment {
                Segment::Suffix => return id_segments.len() > i,
                Segment::Single => {
                    if i >= id_segments.len() {
                        return false;
                    }
                    i += 1;
                }
                Segment::Literal(lit) => {
                    if i >= id_segments.len() || id_segments[i] != lit.as_str() {
                        return false;
                    }
                    i += 1;
                }
            }
        }
        i == id_segments.len()
    }
}

/// Pattern-keyed map from multicast id pattern to the set of subscriber
/// participant ids. Holds its own internal lock rather than relying on a
/// caller-held one.
#[derive(Default)]
pub struct MulticastReceiverDirectory {
    receivers: Mutex<HashMap<String, (MulticastMatcher, HashSet<String>)>>,
}

impl MulticastReceiverDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        multicast_id_pattern: &str,
        receiver_participant_id: impl Into<String>,
    ) -> Result<(), PatternError> {
        let receiver_participant_id = receiver_participant_id.into();
        log::debug!(
            "register multicast receiver: pattern={multicast_id_pattern} receiver={receiver_participant_id}"
        );
        let mut receivers = self.receivers.lock();
        match receivers.get_mut(multicast_id_pattern) {
            Some((_, ids)) => {
                ids.insert(receiver_participant_id);
            }
            None => {
                let matcher = MulticastMatcher::compile(multicast_id_pattern)?;
                let mut ids = HashSet::new();
                ids.insert(receiver_participant_id);
                receivers.insert(multicast_id_pattern.to_string(), (matcher, ids));
            }
        }
        Ok(())
    }

    /// Removes `receiver_participant_id` from `multicast_id_pattern`;
    /// removes the pattern entry entirely once its last subscriber is gone.
    /// Returns `true` if the receiver was present.
    pub fn unregister(&self, multicast_id_pattern: &str, receiver_participant_id: &str) -> bool {
        let mut receivers = self.receivers.lock();
        let Some((_, ids)) = receivers.get_mut(multicast_id_pattern) else {
            return false;
        };
        let removed = ids.remove(receiver_participant_id);
        if ids.is_empty() {
            receivers.remove(multicast_id_pattern);
            log::debug!("removed last multicast receiver, dropping pattern={multicast_id_pattern}");
        }
        removed
    }

    /// Union of subscriber ids whose compiled pattern matches `multicast_id`.
    pub fn get_receivers(&self, multicast_id: &str) -> HashSet<String> {
        let receivers = self.receivers.lock();
        let mut result = HashSet::new();
        for (matcher, ids) in receivers.values() {
            if matcher.matches(multicast_id) {
                result.extend(ids.iter().cloned());
            }
        }
        result
    }

    pub fn contains_pattern(&self, multicast_id_pattern: &str) -> bool {
        self.receivers.lock().contains_key(multicast_id_pattern)
    }

    pub fn contains_receiver(&self, multicast_id_pattern: &str, receiver_participant_id: &str) -> bool {
        self.receivers
            .lock()
            .get(multicast_id_pattern)
            .is_some_and(|(_, ids)| ids.contains(receiver_participant_id))
    }

    pub fn patterns(&self) -> Vec<String> {
        self.receivers.lock().keys().cloned().collect()
    }

    /// Snapshot for persistence: pattern -> subscriber ids.
    pub fn snapshot(&self) -> HashMap<String, HashSet<String>> {
        self.receivers
            .lock()
            .iter()
            .map(|(pattern, (_, ids))| (pattern.clone(), ids.clone()))
            .collect()
    }

    /// Replaces the directory's contents from a persisted snapshot.
    /// Malformed patterns are logged and skipped rather than aborting the
    /// whole load.
    pub fn restore(&self, snapshot: HashMap<String, HashSet<String>>) {
        let mut receivers = self.receivers.lock();
        receivers.clear();
        for (pattern, ids) in snapshot {
            match MulticastMatcher::compile(&pattern) {
                Ok(matcher) => {
                    receivers.insert(pattern, (matcher, ids));
                }
                Err(err) => {
                    log::error!("skipping invalid persisted multicast pattern {pattern}: {err}");
                }
            }
        }
    }
}

/// JSON-serializable form of a directory snapshot, for the persistence file
/// described in the external interfaces section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulticastDirectorySnapshot {
    pub multicast_receivers: HashMap<String, HashSet<String>>,
}

impl From<&MulticastReceiverDirectory> for MulticastDirectorySnapshot {
    fn from(directory: &MulticastReceiverDirectory) -> Self {
        Self {
            multicast_receivers: directory.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_fan_out_scenario() {
        let directory = MulticastReceiverDirectory::new();
        directory.register("prov/brod/+", "R1").unwrap();
        directory.register("prov/brod/a", "R2").unwrap();
        directory.register("prov/brod/a/*", "R3").unwrap();
        directory.register("prov/brod/*", "R4").unwrap();

        let recipients = directory.get_receivers("prov/brod/a");
        let expected: HashSet<String> = ["R1", "R2", "R4"].iter().map(|s| s.to_string()).collect();
        assert_eq!(recipients, expected);
    }

    #[test]
    fn suffix_requires_at_least_one_trailing_segment() {
        let matcher = MulticastMatcher::compile("prov/brod/a/*").unwrap();
        assert!(!matcher.matches("prov/brod/a"));
        assert!(matcher.matches("prov/brod/a/x"));
        assert!(matcher.matches("prov/brod/a/x/y"));
    }

    #[test]
    fn single_wildcard_requires_exactly_one_segment() {
        let matcher = MulticastMatcher::compile("prov/brod/+").unwrap();
        assert!(matcher.matches("prov/brod/a"));
        assert!(!matcher.matches("prov/brod"));
        assert!(!matcher.matches("prov/brod/a/b"));
    }

    #[test]
    fn suffix_not_in_final_position_is_rejected() {
        let err = MulticastMatcher::compile("prov/*/brod").unwrap_err();
        assert_eq!(err, PatternError::SuffixNotFinal("prov/*/brod".to_string()));
    }

    #[test]
    fn last_subscriber_removal_drops_the_pattern() {
        let directory = MulticastReceiverDirectory::new();
        directory.register("prov/brod/+", "R1").unwrap();
        assert!(directory.contains_pattern("prov/brod/+"));
        assert!(directory.unregister("prov/brod/+", "R1"));
        assert!(!directory.contains_pattern("prov/brod/+"));
    }

    #[test]
    fn restore_skips_invalid_patterns() {
        let directory = MulticastReceiverDirectory::new();
        let mut snapshot = HashMap::new();
        snapshot.insert("ok/+".to_string(), ["R1".to_string()].into_iter().collect());
        snapshot.insert("bad/*/x".to_string(), ["R2".to_string()].into_iter().collect());
        directory.restore(snapshot);
        assert!(directory.contains_pattern("ok/+"));
        assert!(!directory.contains_pattern("bad/*/x"));
    }

    fn segment() -> impl proptest::strategy::Strategy<Value = String> {
        "[a-z]{1,5}"
    }

    proptest::proptest! {
        #[test]
        fn a_literal_pattern_only_matches_its_own_id(segments in proptest::collection::vec(segment(), 1..5)) {
            let pattern = segments.join("/");
            let matcher = MulticastMatcher::compile(&pattern).unwrap();
            proptest::prop_assert!(matcher.matches(&pattern));
        }

        #[test]
        fn single_wildcard_matches_any_value_in_its_position(
            prefix in proptest::collection::vec(segment(), 0..3),
            suffix in proptest::collection::vec(segment(), 0..3),
            replaced in segment(),
        ) {
            let mut pattern_segments = prefix.clone();
            pattern_segments.push("+".to_string());
            pattern_segments.extend(suffix.clone());
            let pattern = pattern_segments.join("/");
            let matcher = MulticastMatcher::compile(&pattern).unwrap();

            let mut id_segments = prefix;
            id_segments.push(replaced);
            id_segments.extend(suffix);
            let id = id_segments.join("/");

            proptest::prop_assert!(matcher.matches(&id));
        }

        #[test]
        fn suffix_wildcard_matches_any_nonempty_tail(
            prefix in proptest::collection::vec(segment(), 0..3),
            tail in proptest::collection::vec(segment(), 1..4),
        ) {
            let mut pattern_segments = prefix.clone();
            pattern_segments.push("*".to_string());
            let pattern = pattern_segments.join("/");
            let matcher = MulticastMatcher::compile(&pattern).unwrap();

            let mut id_segments = prefix;
            id_segments.extend(tail);
            let id = id_segments.join("/");

            proptest::prop_assert!(matcher.matches(&id));
        }
    }
}
