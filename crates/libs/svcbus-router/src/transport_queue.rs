//! The transport-not-available queue: messages parked under a transport
//! status id while that transport is down. Unlike the unicast retry queue in
//! `svcbus-message-queue` (keyed by recipient, address not yet known), this
//! queue remembers the destination address and try count so the message can
//! be rescheduled exactly once the transport flips back to available.

use std::collections::HashMap;

use parking_lot::Mutex;
use svcbus_address::Address;
use svcbus_message::Message;

#[derive(Debug, Clone)]
pub struct ParkedMessage {
    pub message: Message,
    pub dest_address: Address,
    pub try_count: u32,
}

#[derive(Default)]
pub struct TransportNotAvailableQueue {
    by_transport: Mutex<HashMap<String, Vec<ParkedMessage>>>,
}

impl TransportNotAvailableQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, transport_id: &str, message: Message, dest_address: Address, try_count: u32) {
        self.by_transport
            .lock()
            .entry(transport_id.to_string())
            .or_default()
            .push(ParkedMessage {
                message,
                dest_address,
                try_count,
            });
    }

    pub fn drain(&self, transport_id: &str) -> Vec<ParkedMessage> {
        self.by_transport
            .lock()
            .remove(transport_id)
            .unwrap_or_default()
    }

    /// Removes parked messages past their own expiry across every transport.
    /// Returns the count removed.
    pub fn sweep_expired(&self, now_ms: i64) -> usize {
        let mut by_transport = self.by_transport.lock();
        let mut removed = 0usize;
        by_transport.retain(|_, parked| {
            let before = parked.len();
            parked.retain(|p| p.message.expiry_date_ms >= now_ms);
            removed += before - parked.len();
            !parked.is_empty()
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.by_transport.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
