use std::collections::HashSet;

use svcbus_discovery_types::DiscoveryError;

/// The set of backends this cluster controller is configured to talk to,
/// plus which one is the default. Used by `svcbus-capabilities-directory`'s
/// `add` path to validate caller-supplied GBIDs.
#[derive(Debug, Clone)]
pub struct KnownGbids {
    known: Vec<String>,
    default_gbid: String,
}

impl KnownGbids {
    pub fn new(known: Vec<String>, default_gbid: impl Into<String>) -> Self {
        Self {
            known,
            default_gbid: default_gbid.into(),
        }
    }

    pub fn known(&self) -> &[String] {
        &self.known
    }

    pub fn default_gbid(&self) -> &str {
        &self.default_gbid
    }

    /// Empty string or duplicate entries ⇒ `InvalidGbid`; any entry absent
    /// from the known set ⇒ `UnknownGbid`. An empty `gbids` list is treated
    /// as "use every known backend".
    pub fn validate(&self, gbids: &[String]) -> Result<Vec<String>, DiscoveryError> {
        if gbids.is_empty() {
            return Ok(self.known.clone());
        }
        let mut seen = HashSet::with_capacity(gbids.len());
        for gbid in gbids {
            if gbid.is_empty() || !seen.insert(gbid.as_str()) {
                return Err(DiscoveryError::InvalidGbid {
                    gbids: gbids.to_vec(),
                });
            }
        }
        for gbid in gbids {
            if !self.known.iter().any(|known| known == gbid) {
                return Err(DiscoveryError::UnknownGbid { gbid: gbid.clone() });
            }
        }
        Ok(gbids.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_expands_to_every_known_gbid() {
        let known = KnownGbids::new(vec!["a".into(), "b".into()], "a");
        assert_eq!(known.validate(&[]).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn empty_string_or_duplicate_is_invalid() {
        let known = KnownGbids::new(vec!["a".into(), "b".into()], "a");
        let dup = vec!["a".to_string(), "".to_string(), "a".to_string()];
        assert!(matches!(
            known.validate(&dup),
            Err(DiscoveryError::InvalidGbid { .. })
        ));
    }

    #[test]
    fn unknown_gbid_is_rejected() {
        let known = KnownGbids::new(vec!["a".to_string(), "b".to_string()], "a");
        let result = known.validate(&["x".to_string()]);
        assert!(matches!(result, Err(DiscoveryError::UnknownGbid { .. })));
    }
}
