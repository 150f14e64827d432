//! The message envelope routed by the cluster controller.
//!
//! This crate treats the wire serialization as opaque (`payload: Vec<u8>`) —
//! the codec itself is an external collaborator, not part of this core.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Custom header carrying the GBID a message should be routed through.
pub const CUSTOM_HEADER_GBID_KEY: &str = "gbid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Request,
    Reply,
    OneWay,
    Multicast,
    Publication,
    SubscriptionRequest,
    MulticastSubscriptionRequest,
    SubscriptionReply,
    SubscriptionStop,
}

impl MessageType {
    pub fn is_multicast(self) -> bool {
        matches!(self, MessageType::Multicast)
    }

    pub fn is_publication(self) -> bool {
        matches!(self, MessageType::Publication)
    }
}

/// Milliseconds since the Unix epoch. Kept as a thin wrapper so call sites
/// read as intent ("now", "expiry") rather than a bare `i64`.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}

/// An immutable routed message. Once constructed, only header mutation
/// (retry bookkeeping is external, on [`MessageType`] callers) is permitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub msg_type: MessageType,
    pub sender: String,
    /// participantId for unicast types, multicastId for `Multicast`.
    pub recipient: String,
    pub expiry_date_ms: i64,
    pub custom_headers: BTreeMap<String, String>,
    pub received_from_global: bool,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        msg_type: MessageType,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        expiry_date_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            msg_type,
            sender: sender.into(),
            recipient: recipient.into(),
            expiry_date_ms,
            custom_headers: BTreeMap::new(),
            received_from_global: false,
            payload: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn received_from_global(mut self, value: bool) -> Self {
        self.received_from_global = value;
        self
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms > self.expiry_date_ms
    }

    pub fn gbid_header(&self) -> Option<&str> {
        self.custom_headers
            .get(CUSTOM_HEADER_GBID_KEY)
            .map(String::as_str)
    }

    /// Short human-readable identifier for log lines, analogous to
    /// `getTrackingInfo()` in the system this crate implements.
    pub fn tracking_info(&self) -> String {
        format!(
            "id={} type={:?} sender={} recipient={}",
            self.id, self.msg_type, self.sender, self.recipient
        )
    }
}
