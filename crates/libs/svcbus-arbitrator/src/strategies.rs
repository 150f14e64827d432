//! Pure, no-I/O provider-selection functions. Each takes the already
//! version-filtered candidate set and either picks one or reports why it
//! couldn't, modeled as a `Result` rather than exceptions-as-control-flow.

use svcbus_discovery_types::{ArbitrationStrategy, DiscoveryEntryWithMetaInfo, DiscoveryQos};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    #[error("no candidates to choose from")]
    NoCandidates,
    #[error("FIXED_PARTICIPANT strategy expects exactly one candidate, found {0}")]
    NotExactlyOne(usize),
    #[error("KEYWORD strategy requires a 'keyword' custom parameter on the discovery QoS")]
    MissingKeywordParameter,
    #[error("no candidate advertises the requested keyword")]
    KeywordNotFound,
    #[error("LOCAL_ONLY strategy is not implemented")]
    LocalOnlyUnimplemented,
}

pub fn select(
    strategy: ArbitrationStrategy,
    candidates: &[DiscoveryEntryWithMetaInfo],
    qos: &DiscoveryQos,
) -> Result<DiscoveryEntryWithMetaInfo, StrategyError> {
    match strategy {
        ArbitrationStrategy::LastSeen => last_seen(candidates),
        ArbitrationStrategy::HighestPriority => highest_priority(candidates),
        ArbitrationStrategy::Keyword => keyword(candidates, qos),
        ArbitrationStrategy::FixedParticipant => fixed_participant(candidates),
        ArbitrationStrategy::LocalOnly => Err(StrategyError::LocalOnlyUnimplemented),
    }
}

fn last_seen(candidates: &[DiscoveryEntryWithMetaInfo]) -> Result<DiscoveryEntryWithMetaInfo, StrategyError> {
    candidates
        .iter()
        .max_by_key(|candidate| candidate.entry.last_seen_date_ms)
        .cloned()
        .ok_or(StrategyError::NoCandidates)
}

fn highest_priority(
    candidates: &[DiscoveryEntryWithMetaInfo],
) -> Result<DiscoveryEntryWithMetaInfo, StrategyError> {
    candidates
        .iter()
        .max_by_key(|candidate| candidate.entry.provider_qos.priority)
        .cloned()
        .ok_or(StrategyError::NoCandidates)
}

fn keyword(
    candidates: &[DiscoveryEntryWithMetaInfo],
    qos: &DiscoveryQos,
) -> Result<DiscoveryEntryWithMetaInfo, StrategyError> {
    let keyword = qos
        .custom_parameters
        .get("keyword")
        .ok_or(StrategyError::MissingKeywordParameter)?;
    candidates
        .iter()
        .find(|candidate| candidate.entry.provider_qos.custom_parameter("keyword") == Some(keyword.as_str()))
        .cloned()
        .ok_or(StrategyError::KeywordNotFound)
}

fn fixed_participant(
    candidates: &[DiscoveryEntryWithMetaInfo],
) -> Result<DiscoveryEntryWithMetaInfo, StrategyError> {
    match candidates {
        [single] => Ok(single.clone()),
        other => Err(StrategyError::NotExactlyOne(other.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use svcbus_discovery_types::{DiscoveryEntry, DiscoveryScope, ProviderQos, ProviderScope, Version};

    fn candidate(last_seen_ms: i64, priority: i64, keyword: Option<&str>) -> DiscoveryEntryWithMetaInfo {
        let mut custom_parameters = Vec::new();
        if let Some(keyword) = keyword {
            custom_parameters.push(("keyword".to_string(), keyword.to_string()));
        }
        DiscoveryEntryWithMetaInfo::cached(DiscoveryEntry {
            provider_version: Version::new(1, 0),
            domain: "d".into(),
            interface_name: "i".into(),
            participant_id: format!("P{last_seen_ms}"),
            provider_qos: ProviderQos {
                priority,
                scope: ProviderScope::Global,
                supports_on_change_subscriptions: false,
                custom_parameters,
            },
            last_seen_date_ms: last_seen_ms,
            expiry_date_ms: i64::MAX,
            public_key_id: String::new(),
        })
    }

    fn qos() -> DiscoveryQos {
        DiscoveryQos {
            discovery_timeout_ms: 1000,
            retry_interval_ms: 100,
            cache_max_age_ms: -1,
            discovery_scope: DiscoveryScope::LocalThenGlobal,
            provider_must_support_on_change: false,
            arbitration_strategy: ArbitrationStrategy::LastSeen,
            custom_parameters: BTreeMap::new(),
        }
    }

    #[test]
    fn last_seen_picks_the_maximum() {
        let candidates: Vec<_> = [1, 2, 3, 4, 5].iter().map(|&t| candidate(t, 0, None)).collect();
        let selected = last_seen(&candidates).unwrap();
        assert_eq!(selected.entry.last_seen_date_ms, 5);
    }

    #[test]
    fn highest_priority_picks_the_maximum() {
        let candidates = vec![candidate(1, 10, None), candidate(2, 99, None), candidate(3, 5, None)];
        let selected = highest_priority(&candidates).unwrap();
        assert_eq!(selected.entry.provider_qos.priority, 99);
    }

    #[test]
    fn keyword_requires_qos_parameter() {
        let candidates = vec![candidate(1, 0, Some("red"))];
        let err = keyword(&candidates, &qos()).unwrap_err();
        assert_eq!(err, StrategyError::MissingKeywordParameter);
    }

    #[test]
    fn keyword_selects_matching_candidate() {
        let mut q = qos();
        q.custom_parameters.insert("keyword".to_string(), "red".to_string());
        let candidates = vec![candidate(1, 0, Some("blue")), candidate(2, 0, Some("red"))];
        let selected = keyword(&candidates, &q).unwrap();
        assert_eq!(selected.entry.participant_id, "P2");
    }

    #[test]
    fn fixed_participant_rejects_multiple_or_zero() {
        assert_eq!(fixed_participant(&[]).unwrap_err(), StrategyError::NoCandidates);
        let two = vec![candidate(1, 0, None), candidate(2, 0, None)];
        assert_eq!(fixed_participant(&two).unwrap_err(), StrategyError::NotExactlyOne(2));
        let one = vec![candidate(1, 0, None)];
        assert!(fixed_participant(&one).is_ok());
    }

    #[test]
    fn local_only_is_unimplemented() {
        assert_eq!(
            select(ArbitrationStrategy::LocalOnly, &[], &qos()).unwrap_err(),
            StrategyError::LocalOnlyUnimplemented
        );
    }
}
