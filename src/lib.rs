//! Delegated Spending Authority Core
//!
//! An owner grants a bounded, revocable spending allowance to a delegate
//! (an automated agent or bot); a scheduler drives that delegate through
//! recurring, unattended operations within its allowance.
//!
//! # Security Model
//!
//! - Every execution, direct or scheduled, passes through one gate
//! - The quota charge and the forward are a single atomic unit: a failed
//!   or timed-out forward leaves the delegate record untouched
//! - Attempts against one delegate are totally ordered by a per-record
//!   lock; distinct delegates proceed in parallel
//! - Full audit trail of all authorization attempts

pub mod audit;
pub mod config;
pub mod forwarder;
pub mod gate;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod task;

mod error;

// Re-export commonly used types
pub use audit::{AuditEntry, AuditLog};
pub use config::{AllowlistPolicy, Config};
pub use error::{Error, Result};
pub use forwarder::{ExecutionForwarder, ForwardOutcome, ScheduleReleaser, SimulatedForwarder};
pub use gate::{AuthorizationGate, ExecutionResult};
pub use registry::{Delegate, DelegateRegistry};
pub use scheduler::{AutomatedOperation, OperationScheduler, OperationStatus};
pub use store::PersistedState;
pub use task::{ExecutionRequest, TaskKind};
