use thiserror::Error;

/// Failure kinds surfaced synchronously by the router's public operations.
/// Anything recoverable (no route yet, transport unavailable, transient
/// transport error) is handled internally by queueing — it never reaches
/// the caller as one of these.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum RoutingError {
    #[error("message {message_id} expired before routing (now={now_ms}, expiry={expiry_ms})")]
    Expired {
        message_id: String,
        now_ms: i64,
        expiry_ms: i64,
    },

    #[error("invalid multicast id pattern: {0}")]
    InvalidPattern(String),

    #[error("provider runtime error: {0}")]
    ProviderRuntime(String),
}

impl From<svcbus_multicast::PatternError> for RoutingError {
    fn from(err: svcbus_multicast::PatternError) -> Self {
        RoutingError::InvalidPattern(err.to_string())
    }
}
