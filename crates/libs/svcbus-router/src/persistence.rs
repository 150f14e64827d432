//! JSON routing-table persistence file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use svcbus_routing_table::RoutingEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingTableDocument {
    pub entries: Vec<RoutingEntry>,
}

pub fn save(path: &Path, entries: Vec<RoutingEntry>) -> std::io::Result<()> {
    let document = RoutingTableDocument { entries };
    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(path, json)
}

/// An absent file is tolerated (returns an empty document); parse errors are
/// logged and `None` is returned so the caller leaves the in-memory table
/// untouched rather than clobbering it with a half-parsed result.
pub fn load(path: &Path) -> Option<RoutingTableDocument> {
    if !path.exists() {
        return Some(RoutingTableDocument { entries: Vec::new() });
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            log::error!("failed to read routing table at {}: {err}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(document) => Some(document),
        Err(err) => {
            log::error!("failed to parse routing table at {}: {err}", path.display());
            None
        }
    }
}
