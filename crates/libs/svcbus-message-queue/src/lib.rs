//! Per-destination FIFO queue of pending messages, with global TTL sweeping.
//!
//! One instance backs the router's "unknown destination" retry queue; a
//! second, separately keyed instance backs the "transport not available"
//! queue. Both share this same structure because the queueing and sweep
//! semantics are identical — only the key space differs (participant id vs.
//! transport id).

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use svcbus_message::Message;

/// A message waiting for its destination key to become routable, plus the
/// wall-clock time it was enqueued (diagnostic only — TTL is the message's
/// own `expiry_date_ms`).
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub destination_key: String,
    pub message: Message,
    pub enqueued_at_ms: i64,
}

/// A FIFO queue per destination key, with a global expiry sweep.
#[derive(Default)]
pub struct DestinationQueue {
    queues: Mutex<HashMap<String, VecDeque<QueuedMessage>>>,
}

impl DestinationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, destination_key: impl Into<String>, message: Message, now_ms: i64) {
        let destination_key = destination_key.into();
        log::debug!("enqueueing message for destinationKey={destination_key}");
        self.queues
            .lock()
            .entry(destination_key.clone())
            .or_default()
            .push_back(QueuedMessage {
                destination_key,
                message,
                enqueued_at_ms: now_ms,
            });
    }

    /// Removes and returns every message queued under `destination_key`, in
    /// FIFO order, as if about to be rescheduled now that the key is
    /// routable.
    pub fn drain(&self, destination_key: &str) -> Vec<QueuedMessage> {
        self.queues
            .lock()
            .remove(destination_key)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Removes every message whose `expiry_date_ms < now_ms` across all
    /// keys. Returns the count removed. Empty per-key queues are dropped
    /// entirely so the map doesn't grow unbounded with dead keys.
    pub fn sweep_expired(&self, now_ms: i64) -> usize {
        let mut queues = self.queues.lock();
        let mut removed = 0usize;
        queues.retain(|_, queue| {
            let before = queue.len();
            queue.retain(|queued| queued.message.expiry_date_ms >= now_ms);
            removed += before - queue.len();
            !queue.is_empty()
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.queues.lock().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, destination_key: &str) -> bool {
        self.queues.lock().contains_key(destination_key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.queues.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svcbus_message::MessageType;

    fn msg(id: &str, expiry_ms: i64) -> Message {
        Message::new(id, MessageType::Request, "sender", "recipient", expiry_ms)
    }

    #[test]
    fn fifo_order_is_preserved() {
        let queue = DestinationQueue::new();
        queue.enqueue("P1", msg("a", i64::MAX), 0);
        queue.enqueue("P1", msg("b", i64::MAX), 0);
        let drained = queue.drain("P1");
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message.id, "a");
        assert_eq!(drained[1].message.id, "b");
        assert!(!queue.contains_key("P1"));
    }

    #[test]
    fn sweep_removes_only_expired_and_drops_empty_keys() {
        let queue = DestinationQueue::new();
        queue.enqueue("expired", msg("a", 100), 0);
        queue.enqueue("fresh", msg("b", 10_000), 0);
        let removed = queue.sweep_expired(1_000);
        assert_eq!(removed, 1);
        assert!(!queue.contains_key("expired"));
        assert!(queue.contains_key("fresh"));
    }

    #[test]
    fn drain_on_missing_key_is_empty() {
        let queue = DestinationQueue::new();
        assert!(queue.drain("missing").is_empty());
    }

    #[test]
    fn len_sums_across_keys() {
        let queue = DestinationQueue::new();
        queue.enqueue("P1", msg("a", i64::MAX), 0);
        queue.enqueue("P2", msg("b", i64::MAX), 0);
        queue.enqueue("P2", msg("c", i64::MAX), 0);
        assert_eq!(queue.len(), 3);
    }
}
