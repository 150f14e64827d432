use thiserror::Error;
use svcbus_discovery_types::Version;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ArbitrationError {
    #[error("no compatible provider found, incompatible versions observed: {incompatible_versions:?}")]
    NoCompatibleProviderFound { incompatible_versions: Vec<Version> },

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("arbitration was stopped")]
    Cancelled,
}

/// Internal per-attempt failure, before it's known whether the deadline has
/// passed (in which case it becomes an [`ArbitrationError`]) or there's
/// still time to retry.
#[derive(Debug, Clone)]
pub(crate) enum AttemptError {
    NoCompatible(Vec<Version>),
    Other(String),
}

impl AttemptError {
    pub(crate) fn into_arbitration_error(self) -> ArbitrationError {
        match self {
            AttemptError::NoCompatible(incompatible_versions) => {
                ArbitrationError::NoCompatibleProviderFound { incompatible_versions }
            }
            AttemptError::Other(message) => ArbitrationError::Discovery(message),
        }
    }
}
