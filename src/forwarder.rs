//! Execution forwarding collaborators
//!
//! The gate never touches the chain itself. It hands validated requests to
//! an [`ExecutionForwarder`], which performs the real side effect and
//! reports back. The scheduler likewise notifies a [`ScheduleReleaser`]
//! when an operation record is deleted so any upstream schedule resource
//! can be released.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of a single forward attempt
#[derive(Debug, Clone)]
pub struct ForwardOutcome {
    pub success: bool,
    pub failure_reason: Option<String>,
}

impl ForwardOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Performs the actual side-effecting action for a validated request.
///
/// The caller supplies the deadline; an implementation that blocks past it
/// is treated the same as one that reported failure.
#[async_trait]
pub trait ExecutionForwarder: Send + Sync {
    async fn forward(&self, target: Address, value: U256, payload: &Value) -> ForwardOutcome;
}

/// Notified when a terminal operation record is deleted, so the backing
/// schedule resource can be torn down.
#[async_trait]
pub trait ScheduleReleaser: Send + Sync {
    async fn release(&self, operation_id: Uuid);
}

/// Forwarder that executes nothing.
///
/// Logs what would have been forwarded and reports a configurable outcome.
/// Used by the CLI and as a test double; it never signs or submits a
/// transaction.
#[derive(Debug, Clone, Default)]
pub struct SimulatedForwarder {
    failure: Option<String>,
    delay: Option<Duration>,
}

impl SimulatedForwarder {
    /// Forwarder that always succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Forwarder that always fails with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            delay: None,
        }
    }

    /// Sleep for `delay` before responding (for exercising timeouts)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ExecutionForwarder for SimulatedForwarder {
    async fn forward(&self, target: Address, value: U256, payload: &Value) -> ForwardOutcome {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.failure {
            Some(reason) => {
                tracing::info!(
                    target_address = %target,
                    value = %value,
                    reason = %reason,
                    "Simulated forward failed"
                );
                ForwardOutcome::failed(reason.clone())
            }
            None => {
                tracing::info!(
                    target_address = %target,
                    value = %value,
                    payload = %payload,
                    "Simulated forward succeeded"
                );
                ForwardOutcome::ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn simulated_forwarder_succeeds_by_default() {
        let forwarder = SimulatedForwarder::new();
        let outcome = forwarder
            .forward(Address::repeat_byte(1), U256::from(10), &json!({}))
            .await;
        assert!(outcome.success);
        assert!(outcome.failure_reason.is_none());
    }

    #[tokio::test]
    async fn failing_forwarder_reports_reason() {
        let forwarder = SimulatedForwarder::failing("insufficient gas");
        let outcome = forwarder
            .forward(Address::repeat_byte(1), U256::from(10), &json!({}))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.failure_reason.as_deref(), Some("insufficient gas"));
    }
}
