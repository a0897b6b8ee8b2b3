//! Operation scheduler
//!
//! Drives recurring and one-shot automated operations through the
//! authorization gate. The scheduler is only a periodic caller: every
//! quota decision stays inside the gate, and a failed operation is left
//! terminal for inspection, never retried.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::forwarder::ScheduleReleaser;
use crate::gate::AuthorizationGate;
use crate::task::{ExecutionRequest, TaskKind};

/// Lifecycle of an automated operation.
///
/// `SCHEDULED -> RUNNING -> {RUNNING (loop) | COMPLETED | FAILED}`, with
/// `CANCELLED` reachable from any non-terminal state. Terminal states are
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

/// A scheduled, possibly recurring, unattended operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomatedOperation {
    pub id: Uuid,
    pub delegate_id: Address,
    pub name: String,
    pub task: TaskKind,
    /// Re-arm interval; `None` makes the operation one-shot
    pub repeat_interval_ms: Option<u64>,
    /// Cap on successful executions; `None` repeats until failure or cancel
    pub max_executions: Option<u32>,
    pub executions_completed: u32,
    pub status: OperationStatus,
    pub scheduled_at: DateTime<Utc>,
    pub next_run_at: DateTime<Utc>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub last_failure_reason: Option<String>,
}

/// Periodic driver of automated operations
#[derive(Clone)]
pub struct OperationScheduler {
    gate: AuthorizationGate,
    operations: Arc<RwLock<HashMap<Uuid, AutomatedOperation>>>,
    releaser: Option<Arc<dyn ScheduleReleaser>>,
}

impl OperationScheduler {
    pub fn new(gate: AuthorizationGate) -> Self {
        Self {
            gate,
            operations: Arc::new(RwLock::new(HashMap::new())),
            releaser: None,
        }
    }

    /// Collaborator notified when a deleted operation's backing schedule
    /// resource should be released
    pub fn with_releaser(mut self, releaser: Arc<dyn ScheduleReleaser>) -> Self {
        self.releaser = Some(releaser);
        self
    }

    /// Seed the scheduler with persisted operation records
    pub async fn restore(&self, operations: Vec<AutomatedOperation>) {
        let mut ops = self.operations.write().await;
        for op in operations {
            ops.insert(op.id, op);
        }
    }

    /// Create a new operation, due immediately.
    ///
    /// The task payload is validated here; a delegate that is missing or
    /// over quota only surfaces when the operation runs, as terminal
    /// FAILED state, never as a schedule-time error.
    pub async fn schedule_operation(
        &self,
        delegate_id: Address,
        name: impl Into<String>,
        task: TaskKind,
        repeat_interval_ms: Option<u64>,
        max_executions: Option<u32>,
    ) -> Result<AutomatedOperation> {
        task.validate()?;

        let now = Utc::now();
        let operation = AutomatedOperation {
            id: Uuid::new_v4(),
            delegate_id,
            name: name.into(),
            task,
            repeat_interval_ms,
            max_executions,
            executions_completed: 0,
            status: OperationStatus::Scheduled,
            scheduled_at: now,
            next_run_at: now,
            last_executed_at: None,
            last_failure_reason: None,
        };

        let mut ops = self.operations.write().await;
        ops.insert(operation.id, operation.clone());

        info!(
            operation = %operation.id,
            delegate = %delegate_id,
            name = %operation.name,
            task = operation.task.tag(),
            repeat_interval_ms = ?repeat_interval_ms,
            max_executions = ?max_executions,
            "Scheduled operation"
        );
        Ok(operation)
    }

    /// Execute every due operation once. Returns the number of attempts.
    ///
    /// `now` is injected by the caller so the periodic driver and tests
    /// share one code path.
    pub async fn tick(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<Uuid> = {
            let ops = self.operations.read().await;
            let mut due: Vec<(DateTime<Utc>, Uuid)> = ops
                .values()
                .filter(|op| !op.status.is_terminal() && op.next_run_at <= now)
                .map(|op| (op.next_run_at, op.id))
                .collect();
            due.sort();
            due.into_iter().map(|(_, id)| id).collect()
        };

        let mut attempts = 0;
        for id in due {
            // Mark RUNNING and snapshot the task; the record lock is not
            // held across the gate call.
            let (delegate_id, task) = {
                let mut ops = self.operations.write().await;
                let Some(op) = ops.get_mut(&id) else { continue };
                if op.status.is_terminal() || op.next_run_at > now {
                    continue;
                }
                op.status = OperationStatus::Running;
                (op.delegate_id, op.task.clone())
            };

            attempts += 1;
            let result = match ExecutionRequest::for_task(delegate_id, &task) {
                Ok(request) => self.gate.authorize_and_execute(request).await,
                Err(e) => Err(e),
            };

            let mut ops = self.operations.write().await;
            let Some(op) = ops.get_mut(&id) else { continue };
            if op.status != OperationStatus::Running {
                // Cancelled while the execution was in flight. The forward
                // already happened and its quota commit stands; the record
                // stays CANCELLED untouched.
                debug!(operation = %id, "Dropping in-flight result for cancelled operation");
                continue;
            }

            match result {
                Ok(execution) => {
                    op.executions_completed += 1;
                    op.last_executed_at = Some(now);

                    let rearm = op.repeat_interval_ms.is_some()
                        && op
                            .max_executions
                            .map_or(true, |max| op.executions_completed < max);
                    if rearm {
                        let interval = op.repeat_interval_ms.unwrap_or(0);
                        op.next_run_at = now + chrono::Duration::milliseconds(interval as i64);
                        debug!(
                            operation = %id,
                            executions_completed = op.executions_completed,
                            next_run_at = %op.next_run_at,
                            spent_amount = %execution.spent_amount,
                            "Operation executed, re-armed"
                        );
                    } else {
                        op.status = OperationStatus::Completed;
                        info!(
                            operation = %id,
                            executions_completed = op.executions_completed,
                            "Operation completed"
                        );
                    }
                }
                Err(e) => {
                    op.status = OperationStatus::Failed;
                    op.last_failure_reason = Some(e.to_string());
                    warn!(operation = %id, error = %e, "Operation failed, not retrying");
                }
            }
        }
        attempts
    }

    /// Cancel a non-terminal operation. Takes effect between ticks; an
    /// execution already in flight completes first.
    pub async fn cancel_operation(&self, id: Uuid) -> Result<()> {
        let mut ops = self.operations.write().await;
        let op = ops
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("operation {id}")))?;

        if op.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "operation {id} is already {:?}",
                op.status
            )));
        }

        op.status = OperationStatus::Cancelled;
        info!(operation = %id, "Cancelled operation");
        Ok(())
    }

    /// Delete a terminal operation record and release its schedule resource
    pub async fn delete_operation(&self, id: Uuid) -> Result<AutomatedOperation> {
        let removed = {
            let mut ops = self.operations.write().await;
            match ops.entry(id) {
                std::collections::hash_map::Entry::Vacant(_) => {
                    return Err(Error::NotFound(format!("operation {id}")))
                }
                std::collections::hash_map::Entry::Occupied(entry) => {
                    if !entry.get().status.is_terminal() {
                        return Err(Error::InvalidState(format!(
                            "operation {id} is {:?}, cancel it before deleting",
                            entry.get().status
                        )));
                    }
                    entry.remove()
                }
            }
        };

        if let Some(releaser) = &self.releaser {
            releaser.release(id).await;
        }
        info!(operation = %id, "Deleted operation");
        Ok(removed)
    }

    pub async fn get_operation(&self, id: Uuid) -> Result<AutomatedOperation> {
        let ops = self.operations.read().await;
        ops.get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("operation {id}")))
    }

    /// Operation snapshots, newest first, optionally filtered by delegate
    pub async fn list_operations(&self, delegate_id: Option<Address>) -> Vec<AutomatedOperation> {
        let ops = self.operations.read().await;
        let mut list: Vec<AutomatedOperation> = ops
            .values()
            .filter(|op| delegate_id.map_or(true, |id| op.delegate_id == id))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
        list
    }

    /// Snapshot for persistence
    pub async fn snapshot(&self) -> Vec<AutomatedOperation> {
        self.list_operations(None).await
    }

    /// Drive `tick` on a fixed interval until the task is aborted
    pub async fn run(&self, interval: Duration) {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            timer.tick().await;
            let attempts = self.tick(Utc::now()).await;
            if attempts > 0 {
                debug!(attempts, "Scheduler tick finished");
            }
        }
    }
}
