use std::sync::atomic::{AtomicU64, Ordering};

/// Plain counters snapshot — no external metrics backend is wired, but the
/// routed-message count itself is required by the queue cleaner's log line.
#[derive(Default)]
pub struct RouterStats {
    routed: AtomicU64,
    queued: AtomicU64,
    dropped: AtomicU64,
    transmitted: AtomicU64,
}

impl RouterStats {
    pub fn record_routed(&self) {
        self.routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transmitted(&self) {
        self.transmitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            routed: self.routed.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            transmitted: self.transmitted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouterStatsSnapshot {
    pub routed: u64,
    pub queued: u64,
    pub dropped: u64,
    pub transmitted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let stats = RouterStats::default();
        stats.record_routed();
        stats.record_routed();
        stats.record_queued();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.routed, 2);
        assert_eq!(snapshot.queued, 1);
        assert_eq!(snapshot.dropped, 0);
    }
}
