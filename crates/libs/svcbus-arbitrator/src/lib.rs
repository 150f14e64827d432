//! Consumer-side arbitration: repeatedly query a discovery service until a
//! strategy function picks a compatible provider, or the discovery deadline
//! is reached.
//!
//! The retry loop itself lives on the async runtime rather than a dedicated
//! OS thread; cancellation is a single `tokio_util::sync::CancellationToken`
//! observed between attempts, matching the cancellation-token convention
//! already used for shutdown signalling elsewhere in this workspace.

mod error;
pub mod strategies;

pub use error::ArbitrationError;
pub use strategies::StrategyError;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use svcbus_discovery_types::{
    ArbitrationResult, ArbitrationStrategy, DiscoveryEntryWithMetaInfo, DiscoveryError, DiscoveryQos,
    Version,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use error::AttemptError;

/// What the arbitrator needs from the discovery service. Implemented by
/// `svcbus-capabilities-directory`'s LCD orchestrator in production; tests
/// use an in-memory double.
#[async_trait]
pub trait DiscoveryProxy: Send + Sync {
    async fn lookup_by_domains(
        &self,
        domains: &[String],
        interface_name: &str,
        discovery_qos: &DiscoveryQos,
        gbids: &[String],
    ) -> Result<Vec<DiscoveryEntryWithMetaInfo>, DiscoveryError>;

    async fn lookup_by_participant_id(
        &self,
        participant_id: &str,
        discovery_qos: &DiscoveryQos,
        gbids: &[String],
    ) -> Result<DiscoveryEntryWithMetaInfo, DiscoveryError>;
}

/// One arbitration request. `fixed_participant_id` is consulted only when
/// `discovery_qos.arbitration_strategy` is `FixedParticipant`; it is a logic
/// error (not validated here) to select that strategy without supplying it.
#[derive(Debug, Clone)]
pub struct ArbitrationRequest {
    pub domains: Vec<String>,
    pub interface_name: String,
    pub expected_version: Version,
    pub discovery_qos: DiscoveryQos,
    pub gbids: Vec<String>,
    pub fixed_participant_id: Option<String>,
    /// Disables version-compatibility filtering entirely when `false`.
    pub filter_incompatible_versions: bool,
}

impl ArbitrationRequest {
    pub fn new(
        domains: Vec<String>,
        interface_name: impl Into<String>,
        expected_version: Version,
        discovery_qos: DiscoveryQos,
        gbids: Vec<String>,
    ) -> Self {
        Self {
            domains,
            interface_name: interface_name.into(),
            expected_version,
            discovery_qos,
            gbids,
            fixed_participant_id: None,
            filter_incompatible_versions: true,
        }
    }

    pub fn with_fixed_participant_id(mut self, participant_id: impl Into<String>) -> Self {
        self.fixed_participant_id = Some(participant_id.into());
        self
    }
}

/// One arbitration run. Each instance owns its own cancellation token —
/// `stop_arbitration` observed between retries, never mid-attempt.
pub struct Arbitrator {
    proxy: Arc<dyn DiscoveryProxy>,
    cancel: CancellationToken,
}

impl Arbitrator {
    pub fn new(proxy: Arc<dyn DiscoveryProxy>) -> Self {
        Self {
            proxy,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the cooperative cancellation flag. Observed at the next retry
    /// boundary; an attempt already in flight runs to completion.
    pub fn stop_arbitration(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drives the core loop: attempt, filter, select; retry on failure
    /// until the deadline, then fail with whichever of
    /// `NoCompatibleProviderFound` or the last underlying cause applies.
    pub async fn start_arbitration(
        &self,
        request: ArbitrationRequest,
    ) -> Result<ArbitrationResult, ArbitrationError> {
        let deadline = Instant::now() + Duration::from_millis(request.discovery_qos.discovery_timeout_ms.max(0) as u64);
        let retry_interval = Duration::from_millis(request.discovery_qos.retry_interval_ms.max(0) as u64);

        let mut last_error: Option<AttemptError> = None;
        loop {
            if self.cancel.is_cancelled() {
                return Err(ArbitrationError::Cancelled);
            }

            match self.attempt_arbitration(&request).await {
                Ok(result) => return Ok(result),
                Err(attempt_error) => {
                    last_error = Some(attempt_error);
                }
            }

            if Instant::now() >= deadline {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(retry_interval) => {}
                _ = self.cancel.cancelled() => return Err(ArbitrationError::Cancelled),
            }
        }

        Err(last_error
            .map(AttemptError::into_arbitration_error)
            .unwrap_or(ArbitrationError::Discovery("discovery deadline reached with no attempts".to_string())))
    }

    async fn attempt_arbitration(
        &self,
        request: &ArbitrationRequest,
    ) -> Result<ArbitrationResult, AttemptError> {
        let entries = self.lookup(request).await.map_err(|err| AttemptError::Other(err.to_string()))?;

        let on_change_filtered: Vec<DiscoveryEntryWithMetaInfo> = if request.discovery_qos.provider_must_support_on_change {
            entries
                .into_iter()
                .filter(|candidate| candidate.entry.provider_qos.supports_on_change_subscriptions)
                .collect()
        } else {
            entries
        };

        let mut incompatible_versions = Vec::new();
        let compatible: Vec<DiscoveryEntryWithMetaInfo> = if request.filter_incompatible_versions {
            on_change_filtered
                .into_iter()
                .filter(|candidate| {
                    let compatible = candidate
                        .entry
                        .provider_version
                        .is_compatible_with(&request.expected_version);
                    if !compatible {
                        incompatible_versions.push(candidate.entry.provider_version);
                    }
                    compatible
                })
                .collect()
        } else {
            on_change_filtered
        };

        match strategies::select(
            request.discovery_qos.arbitration_strategy,
            &compatible,
            &request.discovery_qos,
        ) {
            Ok(selected) => Ok(ArbitrationResult {
                selected,
                incompatible_versions,
            }),
            Err(_) if !incompatible_versions.is_empty() && compatible.is_empty() => {
                Err(AttemptError::NoCompatible(incompatible_versions))
            }
            Err(strategy_error) => Err(AttemptError::Other(strategy_error.to_string())),
        }
    }

    async fn lookup(
        &self,
        request: &ArbitrationRequest,
    ) -> Result<Vec<DiscoveryEntryWithMetaInfo>, DiscoveryError> {
        if request.discovery_qos.arbitration_strategy == ArbitrationStrategy::FixedParticipant {
            let participant_id = request.fixed_participant_id.as_deref().ok_or_else(|| {
                DiscoveryError::Internal {
                    message: "FIXED_PARTICIPANT strategy requires a participant id".to_string(),
                }
            })?;
            let entry = self
                .proxy
                .lookup_by_participant_id(participant_id, &request.discovery_qos, &request.gbids)
                .await?;
            Ok(vec![entry])
        } else {
            self.proxy
                .lookup_by_domains(
                    &request.domains,
                    &request.interface_name,
                    &request.discovery_qos,
                    &request.gbids,
                )
                .await
        }
    }
}
