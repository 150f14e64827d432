//! Transport boundary: everything the router needs from the wire layer,
//! expressed as traits. Concrete transports (MQTT, WebSocket, UDS, in-process)
//! are external collaborators and are not implemented by this crate.

use async_trait::async_trait;
use svcbus_address::Address;
use svcbus_message::Message;

/// A transient transport failure that carries a retry delay, as opposed to a
/// permanent failure which the router logs and drops.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransmitError {
    /// The stub could not deliver right now but expects to be able to after
    /// `delay_ms`. The router reschedules with `tryCount + 1`.
    #[error("transmission delayed by {delay_ms}ms: {reason}")]
    Delay { delay_ms: u64, reason: String },

    /// A non-retryable failure. The router logs and drops the message.
    #[error("transmission failed permanently: {0}")]
    Permanent(String),
}

/// A transport-specific send capability obtained from a [`MessagingStubFactory`].
#[async_trait]
pub trait MessagingStub: Send + Sync {
    async fn transmit(&self, message: &Message) -> Result<(), TransmitError>;
}

/// Given an [`Address`], returns an active send capability, or `None` if no
/// transport matches (e.g. the address variant has no registered handler).
pub trait MessagingStubFactory: Send + Sync {
    fn create(&self, address: &Address) -> Option<Box<dyn MessagingStub>>;
}

/// Reports whether a transport is currently able to send. The router checks
/// this before creating a stub so it can park messages in the
/// transport-not-available queue rather than attempt and fail.
pub trait TransportStatus: Send + Sync {
    /// Whether this status object governs delivery to `address`.
    fn is_responsible_for(&self, address: &Address) -> bool;

    fn is_available(&self) -> bool;

    /// Stable identifier used as the transport-not-available queue's key.
    fn transport_id(&self) -> &str;
}

/// Given an outbound multicast message, returns the set of global transport
/// addresses to fan out to. Distinct from the multicast receiver directory,
/// which only knows about locally registered subscribers.
pub trait MulticastAddressCalculator: Send + Sync {
    fn calculate(&self, message: &Message) -> Vec<Address>;
}

/// Hook invoked when a provider's address owns a subscriber skeleton (e.g. a
/// broker-subscribe primitive) that must be told about multicast
/// registrations explicitly.
pub trait MulticastSubscriptionSkeleton: Send + Sync {
    fn register_multicast_subscription(&self, multicast_id: &str);
    fn unregister_multicast_subscription(&self, multicast_id: &str);
}

/// Resolves the subscriber skeleton (if any) a provider's address owns.
/// Most transports have none — only brokered ones (e.g. Mqtt) need to be
/// told explicitly about a new multicast subscription.
pub trait MulticastSkeletonFactory: Send + Sync {
    fn skeleton_for(&self, address: &Address) -> Option<std::sync::Arc<dyn MulticastSubscriptionSkeleton>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct AlwaysOn;
    impl TransportStatus for AlwaysOn {
        fn is_responsible_for(&self, _address: &Address) -> bool {
            true
        }
        fn is_available(&self) -> bool {
            true
        }
        fn transport_id(&self) -> &str {
            "always-on"
        }
    }

    struct RecordingStub {
        transmitted: Arc<AtomicBool>,
    }

    #[async_trait]
    impl MessagingStub for RecordingStub {
        async fn transmit(&self, _message: &Message) -> Result<(), TransmitError> {
            self.transmitted.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn stub_records_transmit() {
        let flag = Arc::new(AtomicBool::new(false));
        let stub = RecordingStub {
            transmitted: flag.clone(),
        };
        let message = Message::new(
            "1",
            svcbus_message::MessageType::OneWay,
            "s",
            "r",
            i64::MAX,
        );
        stub.transmit(&message).await.unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn transport_status_reports_responsibility() {
        let status = AlwaysOn;
        assert!(status.is_responsible_for(&Address::mqtt("tcp://b", "t")));
        assert!(status.is_available());
    }
}
