//! Periodic `touch` heartbeat for locally registered GLOBAL providers,
//! grouped by the first gbid each participant is known under.

use std::collections::HashMap;

use svcbus_capabilities_store::LcdStore;
use svcbus_gcd_client::GlobalCapabilitiesDirectoryClient;

pub(crate) async fn run_freshness_touch(
    store: &LcdStore,
    gcd_client: &dyn GlobalCapabilitiesDirectoryClient,
    cluster_controller_id: &str,
) {
    let locals = store.locally_registered_globals();
    let mut by_gbid: HashMap<String, Vec<String>> = HashMap::new();
    for entry in locals {
        let gbids = store.gbids_for_participant(&entry.participant_id);
        match gbids.first() {
            Some(gbid) => by_gbid.entry(gbid.clone()).or_default().push(entry.participant_id),
            None => log::warn!(
                "skipping freshness touch for participantId={}: no known gbid",
                entry.participant_id
            ),
        }
    }

    for (gbid, participant_ids) in by_gbid {
        if let Err(err) = gcd_client.touch(cluster_controller_id, participant_ids, &gbid).await {
            log::warn!("freshness touch failed for gbid={gbid}: {err}");
        }
    }
}
