//! JSON persistence file for locally registered discovery entries.

use std::path::Path;

use serde::{Deserialize, Serialize};
use svcbus_discovery_types::DiscoveryEntry;

/// A locally registered entry paired with the gbids it is known under (empty
/// for a LOCAL-scope entry, which was never advertised globally).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedLocal {
    pub entry: DiscoveryEntry,
    pub gbids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalsDocument {
    pub entries: Vec<PersistedLocal>,
}

pub fn save(path: &Path, entries: Vec<PersistedLocal>) -> std::io::Result<()> {
    let document = LocalsDocument { entries };
    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(path, json)
}

/// An absent file is tolerated (returns an empty document); parse errors are
/// logged and `None` is returned so the caller leaves the in-memory store
/// untouched rather than clobbering it with a half-parsed result.
pub fn load(path: &Path) -> Option<LocalsDocument> {
    if !path.exists() {
        return Some(LocalsDocument::default());
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            log::error!("failed to read LCD locals at {}: {err}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(document) => Some(document),
        Err(err) => {
            log::error!("failed to parse LCD locals at {}: {err}", path.display());
            None
        }
    }
}
