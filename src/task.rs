//! Task variants and execution requests
//!
//! Automated operations are dispatched by task kind. Each kind carries a
//! typed payload that is validated when the task is built, not when it is
//! executed, so a malformed operation can never reach the gate.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A single action a delegate can perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "lowercase")]
pub enum TaskKind {
    /// Transfer `amount` to `to`
    Send { to: Address, amount: U256 },
    /// Swap `amount` of `input_token` for `output_token` through `router`
    Swap {
        router: Address,
        input_token: Address,
        output_token: Address,
        amount: U256,
    },
    /// Deposit `amount` into a staking pool
    Stake { pool: Address, amount: U256 },
    /// Withdraw `amount` from a staking pool
    Unstake { pool: Address, amount: U256 },
    /// Collect accrued rewards from a pool
    Claim { pool: Address },
}

impl TaskKind {
    pub fn send(to: Address, amount: U256) -> Result<Self> {
        let task = TaskKind::Send { to, amount };
        task.validate()?;
        Ok(task)
    }

    pub fn swap(
        router: Address,
        input_token: Address,
        output_token: Address,
        amount: U256,
    ) -> Result<Self> {
        let task = TaskKind::Swap {
            router,
            input_token,
            output_token,
            amount,
        };
        task.validate()?;
        Ok(task)
    }

    pub fn stake(pool: Address, amount: U256) -> Result<Self> {
        let task = TaskKind::Stake { pool, amount };
        task.validate()?;
        Ok(task)
    }

    pub fn unstake(pool: Address, amount: U256) -> Result<Self> {
        let task = TaskKind::Unstake { pool, amount };
        task.validate()?;
        Ok(task)
    }

    pub fn claim(pool: Address) -> Result<Self> {
        Ok(TaskKind::Claim { pool })
    }

    /// Check the payload shape. Deserialized tasks must pass through this
    /// before they are scheduled.
    pub fn validate(&self) -> Result<()> {
        match self {
            TaskKind::Send { amount, .. } if amount.is_zero() => Err(Error::InvalidArgument(
                "send amount must be greater than 0".to_string(),
            )),
            TaskKind::Swap {
                input_token,
                output_token,
                ..
            } if input_token == output_token => Err(Error::InvalidArgument(
                "swap input and output tokens must differ".to_string(),
            )),
            TaskKind::Swap { amount, .. } if amount.is_zero() => Err(Error::InvalidArgument(
                "swap amount must be greater than 0".to_string(),
            )),
            TaskKind::Stake { amount, .. } | TaskKind::Unstake { amount, .. }
                if amount.is_zero() =>
            {
                Err(Error::InvalidArgument(
                    "stake amount must be greater than 0".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Wire tag, matched against a delegate's `allowed_operations`
    pub fn tag(&self) -> &'static str {
        match self {
            TaskKind::Send { .. } => "send",
            TaskKind::Swap { .. } => "swap",
            TaskKind::Stake { .. } => "stake",
            TaskKind::Unstake { .. } => "unstake",
            TaskKind::Claim { .. } => "claim",
        }
    }

    /// Contract or account the forwarder is pointed at
    pub fn target(&self) -> Address {
        match self {
            TaskKind::Send { to, .. } => *to,
            TaskKind::Swap { router, .. } => *router,
            TaskKind::Stake { pool, .. }
            | TaskKind::Unstake { pool, .. }
            | TaskKind::Claim { pool } => *pool,
        }
    }

    /// Value charged against the delegate's quota.
    ///
    /// Unstake and claim move value toward the owner rather than away, so
    /// they are metered at zero.
    pub fn charged_value(&self) -> U256 {
        match self {
            TaskKind::Send { amount, .. }
            | TaskKind::Swap { amount, .. }
            | TaskKind::Stake { amount, .. } => *amount,
            TaskKind::Unstake { .. } | TaskKind::Claim { .. } => U256::ZERO,
        }
    }
}

/// A single request presented to the authorization gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub delegate_id: Address,
    pub target: Address,
    /// Amount charged against the delegate's quota (smallest currency unit)
    pub value: U256,
    /// Tag matched against the delegate's `allowed_operations`
    pub operation_tag: String,
    /// Opaque payload handed to the forwarder unchanged
    pub payload: Value,
}

impl ExecutionRequest {
    pub fn new(
        delegate_id: Address,
        target: Address,
        value: U256,
        operation_tag: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            delegate_id,
            target,
            value,
            operation_tag: operation_tag.into(),
            payload,
        }
    }

    /// Build the request a scheduled task executes as
    pub fn for_task(delegate_id: Address, task: &TaskKind) -> Result<Self> {
        Ok(Self {
            delegate_id,
            target: task.target(),
            value: task.charged_value(),
            operation_tag: task.tag().to_string(),
            payload: serde_json::to_value(task)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn tags_match_wire_names() {
        let send = TaskKind::send(addr(1), U256::from(10)).unwrap();
        let swap = TaskKind::swap(addr(2), addr(3), addr(4), U256::from(10)).unwrap();
        let stake = TaskKind::stake(addr(5), U256::from(10)).unwrap();
        let unstake = TaskKind::unstake(addr(5), U256::from(10)).unwrap();
        let claim = TaskKind::claim(addr(5)).unwrap();

        assert_eq!(send.tag(), "send");
        assert_eq!(swap.tag(), "swap");
        assert_eq!(stake.tag(), "stake");
        assert_eq!(unstake.tag(), "unstake");
        assert_eq!(claim.tag(), "claim");
    }

    #[test]
    fn zero_amounts_are_rejected_at_construction() {
        assert!(matches!(
            TaskKind::send(addr(1), U256::ZERO),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            TaskKind::swap(addr(2), addr(3), addr(4), U256::ZERO),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            TaskKind::stake(addr(5), U256::ZERO),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn swap_rejects_identical_tokens() {
        let result = TaskKind::swap(addr(2), addr(3), addr(3), U256::from(10));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn unstake_and_claim_charge_nothing() {
        let unstake = TaskKind::unstake(addr(5), U256::from(100)).unwrap();
        let claim = TaskKind::claim(addr(5)).unwrap();
        assert_eq!(unstake.charged_value(), U256::ZERO);
        assert_eq!(claim.charged_value(), U256::ZERO);
    }

    #[test]
    fn serde_uses_task_tag() {
        let task = TaskKind::stake(addr(5), U256::from(42)).unwrap();
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json.get("task").and_then(|v| v.as_str()), Some("stake"));

        let parsed: TaskKind = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, task);
    }

    #[test]
    fn request_for_task_carries_target_and_value() {
        let task = TaskKind::send(addr(9), U256::from(7)).unwrap();
        let request = ExecutionRequest::for_task(addr(1), &task).unwrap();
        assert_eq!(request.delegate_id, addr(1));
        assert_eq!(request.target, addr(9));
        assert_eq!(request.value, U256::from(7));
        assert_eq!(request.operation_tag, "send");
    }
}
