//! Authorization gate
//!
//! Validates a single execution request against a delegate's record and,
//! if every check passes, forwards it and commits the quota charge as one
//! atomic unit. The delegate's lock is held from the first check until the
//! commit or rollback, so no two attempts against the same delegate can
//! observe the same pre-charge spent amount.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditLog};
use crate::config::{AllowlistPolicy, Config};
use crate::error::{Error, Result};
use crate::forwarder::ExecutionForwarder;
use crate::registry::{Delegate, DelegateRegistry};
use crate::task::ExecutionRequest;

/// Result of a committed execution
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub delegate_id: Address,
    pub operation_tag: String,
    pub value: U256,
    /// Spent amount after the commit
    pub spent_amount: U256,
    pub spending_limit: U256,
    pub executed_at: DateTime<Utc>,
}

/// Gate that all executions, direct or scheduled, pass through
#[derive(Clone)]
pub struct AuthorizationGate {
    registry: DelegateRegistry,
    forwarder: Arc<dyn ExecutionForwarder>,
    policy: AllowlistPolicy,
    forward_timeout_ms: u64,
    audit: Option<AuditLog>,
}

impl AuthorizationGate {
    pub fn new(
        registry: DelegateRegistry,
        forwarder: Arc<dyn ExecutionForwarder>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            forwarder,
            policy: config.allowlist_policy,
            forward_timeout_ms: config.forward_timeout_ms,
            audit: None,
        }
    }

    /// Attach an audit log; every attempt is recorded in it
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Validate, forward and commit a single request.
    ///
    /// On any validation error, forwarder failure or timeout the delegate
    /// record is left bit-for-bit unchanged. Only a forwarder success
    /// commits the quota charge and `last_used_at`.
    pub async fn authorize_and_execute(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionResult> {
        let entry = match self.registry.entry(request.delegate_id).await {
            Ok(entry) => entry,
            Err(e) => {
                self.record(&request, "blocked", Some(e.to_string()), None).await;
                return Err(e);
            }
        };

        // Lock held across validate -> forward -> commit
        let mut delegate = entry.lock().await;

        let new_spent = match self.validate(&delegate, &request) {
            Ok(new_spent) => new_spent,
            Err(e) => {
                warn!(
                    delegate = %request.delegate_id,
                    operation_tag = %request.operation_tag,
                    error = %e,
                    "Blocked execution request"
                );
                self.record(&request, "blocked", Some(e.to_string()), None).await;
                return Err(e);
            }
        };

        debug!(
            delegate = %request.delegate_id,
            operation_tag = %request.operation_tag,
            value = %request.value,
            "Validation passed, forwarding"
        );

        let deadline = Duration::from_millis(self.forward_timeout_ms);
        let forward = self
            .forwarder
            .forward(request.target, request.value, &request.payload);

        let outcome = match tokio::time::timeout(deadline, forward).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let err = Error::ForwardingTimeout(self.forward_timeout_ms);
                warn!(
                    delegate = %request.delegate_id,
                    timeout_ms = self.forward_timeout_ms,
                    "Forwarder timed out, rolling back"
                );
                self.record(&request, "forward_timeout", Some(err.to_string()), None)
                    .await;
                return Err(err);
            }
        };

        if !outcome.success {
            let reason = outcome
                .failure_reason
                .unwrap_or_else(|| "unspecified forwarder failure".to_string());
            warn!(
                delegate = %request.delegate_id,
                reason = %reason,
                "Forwarder reported failure, rolling back"
            );
            self.record(&request, "forward_failed", Some(reason.clone()), None)
                .await;
            return Err(Error::ForwardingFailed(reason));
        }

        // Commit
        let now = Utc::now();
        delegate.spent_amount = new_spent;
        delegate.last_used_at = now;

        info!(
            delegate = %request.delegate_id,
            operation_tag = %request.operation_tag,
            value = %request.value,
            spent_amount = %new_spent,
            spending_limit = %delegate.spending_limit,
            "Committed execution"
        );
        self.record(&request, "committed", None, Some(new_spent)).await;

        Ok(ExecutionResult {
            delegate_id: request.delegate_id,
            operation_tag: request.operation_tag,
            value: request.value,
            spent_amount: new_spent,
            spending_limit: delegate.spending_limit,
            executed_at: now,
        })
    }

    /// Run the ordered checks; returns the spent amount a commit would
    /// write. First failing check wins.
    fn validate(&self, delegate: &Delegate, request: &ExecutionRequest) -> Result<U256> {
        if !delegate.is_active {
            return Err(Error::NotActive(delegate.id));
        }

        let allowed = if delegate.allowed_operations.is_empty() {
            self.policy == AllowlistPolicy::EmptyAllowsAll
        } else {
            delegate.allowed_operations.contains(&request.operation_tag)
        };
        if !allowed {
            return Err(Error::OperationNotAllowed {
                delegate: delegate.id,
                tag: request.operation_tag.clone(),
            });
        }

        let quota_exceeded = Error::QuotaExceeded {
            delegate: delegate.id,
            spent: delegate.spent_amount,
            value: request.value,
            limit: delegate.spending_limit,
        };
        match delegate.spent_amount.checked_add(request.value) {
            Some(new_spent) if new_spent <= delegate.spending_limit => Ok(new_spent),
            _ => Err(quota_exceeded),
        }
    }

    async fn record(
        &self,
        request: &ExecutionRequest,
        status: &'static str,
        detail: Option<String>,
        spent_amount: Option<U256>,
    ) {
        if let Some(audit) = &self.audit {
            audit
                .record(&AuditEntry {
                    timestamp: Utc::now(),
                    delegate: request.delegate_id,
                    operation_tag: request.operation_tag.clone(),
                    target: request.target,
                    value: request.value,
                    status,
                    detail,
                    spent_amount,
                })
                .await;
        }
    }
}
