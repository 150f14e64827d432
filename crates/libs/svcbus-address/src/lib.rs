//! Transport-neutral endpoint identifiers used throughout the routing stack.
//!
//! An [`Address`] never carries transport state itself — it names *where* a
//! message should go, and the messaging stub factory is the only thing that
//! turns an address into something that can actually send.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Receive-side capability for an in-process participant.
///
/// `InProcess` addresses are never serialized (a skeleton reference is only
/// meaningful within this process), so the trait carries no serde bound.
pub trait InProcessSkeleton: Send + Sync + fmt::Debug {
    /// Stable key identifying the receiving participant. Used for address
    /// equality/hashing in place of comparing trait objects directly.
    fn skeleton_key(&self) -> &str;
}

/// A shared handle to an in-process skeleton, compared and hashed by
/// [`InProcessSkeleton::skeleton_key`].
#[derive(Clone)]
pub struct InProcessHandle(pub Arc<dyn InProcessSkeleton>);

impl fmt::Debug for InProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InProcessHandle")
            .field(&self.0.skeleton_key())
            .finish()
    }
}

impl PartialEq for InProcessHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.skeleton_key() == other.0.skeleton_key()
    }
}

impl Eq for InProcessHandle {}

impl Hash for InProcessHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.skeleton_key().hash(state);
    }
}

/// Transport-neutral endpoint. Two addresses are equal iff variant tag and
/// all payload fields are equal; hash is derived from the same fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Address {
    Channel { channel_id: String },
    Mqtt { broker_uri: String, topic: String },
    WebSocketServer { host: String, port: u16, path: String },
    WebSocketClient { id: String },
    /// Never persisted — see [`Address::is_in_process`].
    #[serde(skip)]
    InProcess(InProcessHandle),
    Uds { path: String },
}

impl Address {
    pub fn mqtt(broker_uri: impl Into<String>, topic: impl Into<String>) -> Self {
        Address::Mqtt {
            broker_uri: broker_uri.into(),
            topic: topic.into(),
        }
    }

    pub fn in_process(skeleton: Arc<dyn InProcessSkeleton>) -> Self {
        Address::InProcess(InProcessHandle(skeleton))
    }

    /// InProcess entries are never persisted to the routing table file.
    pub fn is_in_process(&self) -> bool {
        matches!(self, Address::InProcess(_))
    }

    /// The broker URI an Mqtt address attaches to, if any — used when an
    /// added provider contributes its own GBID (see capabilities-directory).
    pub fn mqtt_broker_uri(&self) -> Option<&str> {
        match self {
            Address::Mqtt { broker_uri, .. } => Some(broker_uri),
            _ => None,
        }
    }
}
