//! Delegate registry
//!
//! Sole owner of delegate authorization records. Every read or write from
//! the gate and the scheduler goes through here; no other component holds
//! a mutable copy. Each record sits behind its own lock so that attempts
//! against one delegate are totally ordered while distinct delegates
//! proceed in parallel.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::error::{Error, Result};

/// A delegate authorization record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegate {
    /// Address of the delegate agent
    pub id: Address,
    /// Principal that granted the allowance
    pub owner: Address,
    /// Maximum cumulative value this delegate may authorize (smallest unit)
    pub spending_limit: U256,
    /// Value authorized so far; never exceeds `spending_limit`
    pub spent_amount: U256,
    /// Task tags this delegate may execute; empty is policy-driven
    pub allowed_operations: HashSet<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// Thread-safe registry of delegate records
#[derive(Clone, Default)]
pub struct DelegateRegistry {
    inner: Arc<RwLock<HashMap<Address, Arc<Mutex<Delegate>>>>>,
}

impl DelegateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted records
    pub fn from_snapshot(delegates: Vec<Delegate>) -> Self {
        let map = delegates
            .into_iter()
            .map(|d| (d.id, Arc::new(Mutex::new(d))))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Create a new delegate with a fresh quota
    pub async fn create_delegate(
        &self,
        owner: Address,
        id: Address,
        spending_limit: U256,
        allowed_operations: HashSet<String>,
    ) -> Result<Delegate> {
        if spending_limit.is_zero() {
            return Err(Error::InvalidLimit);
        }

        let mut map = self.inner.write().await;
        if map.contains_key(&id) {
            return Err(Error::AlreadyExists(id));
        }

        let now = Utc::now();
        let delegate = Delegate {
            id,
            owner,
            spending_limit,
            spent_amount: U256::ZERO,
            allowed_operations,
            is_active: true,
            created_at: now,
            last_used_at: now,
        };
        map.insert(id, Arc::new(Mutex::new(delegate.clone())));

        info!(
            delegate = %id,
            owner = %owner,
            spending_limit = %spending_limit,
            "Created delegate"
        );
        Ok(delegate)
    }

    /// Raise or lower the spending limit. Owner-only; the new limit may not
    /// fall below what has already been spent.
    pub async fn update_spending_limit(
        &self,
        caller: Address,
        id: Address,
        new_limit: U256,
    ) -> Result<()> {
        let entry = self.entry(id).await?;
        let mut delegate = entry.lock().await;
        check_owner(caller, &delegate)?;

        if new_limit.is_zero() {
            return Err(Error::InvalidLimit);
        }
        if new_limit < delegate.spent_amount {
            return Err(Error::LimitBelowSpent {
                new_limit,
                spent: delegate.spent_amount,
            });
        }

        delegate.spending_limit = new_limit;
        info!(delegate = %id, new_limit = %new_limit, "Updated spending limit");
        Ok(())
    }

    /// Zero the spent amount without touching the activity flag. Owner-only
    /// and idempotent.
    pub async fn reset_spent_amount(&self, caller: Address, id: Address) -> Result<()> {
        let entry = self.entry(id).await?;
        let mut delegate = entry.lock().await;
        check_owner(caller, &delegate)?;

        delegate.spent_amount = U256::ZERO;
        info!(delegate = %id, "Reset spent amount");
        Ok(())
    }

    /// Turn the delegate off. Owner-only; deactivating twice is not an error.
    pub async fn deactivate(&self, caller: Address, id: Address) -> Result<()> {
        let entry = self.entry(id).await?;
        let mut delegate = entry.lock().await;
        check_owner(caller, &delegate)?;

        delegate.is_active = false;
        info!(delegate = %id, "Deactivated delegate");
        Ok(())
    }

    /// Snapshot of a single record
    pub async fn get_delegate(&self, id: Address) -> Result<Delegate> {
        let entry = self.entry(id).await?;
        let delegate = entry.lock().await;
        Ok(delegate.clone())
    }

    /// Permanently delete an inactive record. Owner-only.
    pub async fn remove_delegate(&self, caller: Address, id: Address) -> Result<()> {
        let mut map = self.inner.write().await;
        let entry = map
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("delegate {id}")))?;

        {
            let delegate = entry.lock().await;
            check_owner(caller, &delegate)?;
            if delegate.is_active {
                return Err(Error::InvalidState(format!(
                    "delegate {id} must be deactivated before removal"
                )));
            }
        }

        map.remove(&id);
        info!(delegate = %id, "Removed delegate");
        Ok(())
    }

    /// Snapshots of all records, newest first
    pub async fn list_delegates(&self) -> Vec<Delegate> {
        let map = self.inner.read().await;
        let mut delegates = Vec::with_capacity(map.len());
        for entry in map.values() {
            delegates.push(entry.lock().await.clone());
        }
        delegates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        delegates
    }

    /// Snapshot for persistence
    pub async fn snapshot(&self) -> Vec<Delegate> {
        self.list_delegates().await
    }

    /// Shared handle to a record's lock. The gate holds this lock across
    /// validate, forward and commit.
    pub(crate) async fn entry(&self, id: Address) -> Result<Arc<Mutex<Delegate>>> {
        let map = self.inner.read().await;
        map.get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("delegate {id}")))
    }
}

fn check_owner(caller: Address, delegate: &Delegate) -> Result<()> {
    if caller != delegate.owner {
        return Err(Error::Unauthorized {
            caller,
            delegate: delegate.id,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    const OWNER: u8 = 0xaa;
    const DELEGATE: u8 = 0xbb;

    async fn registry_with_delegate(limit: u64) -> DelegateRegistry {
        let registry = DelegateRegistry::new();
        registry
            .create_delegate(
                addr(OWNER),
                addr(DELEGATE),
                U256::from(limit),
                HashSet::new(),
            )
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn creates_active_delegate_with_zero_spent() {
        let registry = registry_with_delegate(1_000_000).await;
        let delegate = registry.get_delegate(addr(DELEGATE)).await.unwrap();
        assert!(delegate.is_active);
        assert_eq!(delegate.spent_amount, U256::ZERO);
        assert_eq!(delegate.spending_limit, U256::from(1_000_000u64));
        assert_eq!(delegate.owner, addr(OWNER));
    }

    #[tokio::test]
    async fn rejects_duplicate_delegate() {
        let registry = registry_with_delegate(1_000_000).await;
        let result = registry
            .create_delegate(addr(OWNER), addr(DELEGATE), U256::from(5), HashSet::new())
            .await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn rejects_zero_spending_limit() {
        let registry = DelegateRegistry::new();
        let result = registry
            .create_delegate(addr(OWNER), addr(DELEGATE), U256::ZERO, HashSet::new())
            .await;
        assert!(matches!(result, Err(Error::InvalidLimit)));
    }

    #[tokio::test]
    async fn update_limit_below_spent_fails() {
        let registry = registry_with_delegate(1_000_000).await;

        // Simulate spend through the record lock (the gate's commit path)
        {
            let entry = registry.entry(addr(DELEGATE)).await.unwrap();
            entry.lock().await.spent_amount = U256::from(500_000u64);
        }

        let result = registry
            .update_spending_limit(addr(OWNER), addr(DELEGATE), U256::from(300_000u64))
            .await;
        assert!(matches!(result, Err(Error::LimitBelowSpent { .. })));

        // At or above the spent amount succeeds
        registry
            .update_spending_limit(addr(OWNER), addr(DELEGATE), U256::from(500_000u64))
            .await
            .unwrap();
        let delegate = registry.get_delegate(addr(DELEGATE)).await.unwrap();
        assert_eq!(delegate.spending_limit, U256::from(500_000u64));
    }

    #[tokio::test]
    async fn reset_spent_is_idempotent() {
        let registry = registry_with_delegate(1_000_000).await;
        {
            let entry = registry.entry(addr(DELEGATE)).await.unwrap();
            entry.lock().await.spent_amount = U256::from(999u64);
        }

        registry
            .reset_spent_amount(addr(OWNER), addr(DELEGATE))
            .await
            .unwrap();
        registry
            .reset_spent_amount(addr(OWNER), addr(DELEGATE))
            .await
            .unwrap();

        let delegate = registry.get_delegate(addr(DELEGATE)).await.unwrap();
        assert_eq!(delegate.spent_amount, U256::ZERO);
        assert!(delegate.is_active);
    }

    #[tokio::test]
    async fn deactivate_is_idempotent() {
        let registry = registry_with_delegate(1_000_000).await;
        registry.deactivate(addr(OWNER), addr(DELEGATE)).await.unwrap();
        registry.deactivate(addr(OWNER), addr(DELEGATE)).await.unwrap();
        let delegate = registry.get_delegate(addr(DELEGATE)).await.unwrap();
        assert!(!delegate.is_active);
    }

    #[tokio::test]
    async fn remove_requires_deactivation() {
        let registry = registry_with_delegate(1_000_000).await;

        let result = registry.remove_delegate(addr(OWNER), addr(DELEGATE)).await;
        assert!(matches!(result, Err(Error::InvalidState(_))));

        registry.deactivate(addr(OWNER), addr(DELEGATE)).await.unwrap();
        registry
            .remove_delegate(addr(OWNER), addr(DELEGATE))
            .await
            .unwrap();

        let result = registry.get_delegate(addr(DELEGATE)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn owner_checks_reject_other_callers() {
        let registry = registry_with_delegate(1_000_000).await;
        let stranger = addr(0xcc);

        let result = registry
            .update_spending_limit(stranger, addr(DELEGATE), U256::from(2_000_000u64))
            .await;
        assert!(matches!(result, Err(Error::Unauthorized { .. })));

        let result = registry.reset_spent_amount(stranger, addr(DELEGATE)).await;
        assert!(matches!(result, Err(Error::Unauthorized { .. })));

        let result = registry.deactivate(stranger, addr(DELEGATE)).await;
        assert!(matches!(result, Err(Error::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn snapshot_round_trips() {
        let registry = registry_with_delegate(1_000_000).await;
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);

        let restored = DelegateRegistry::from_snapshot(snapshot);
        let delegate = restored.get_delegate(addr(DELEGATE)).await.unwrap();
        assert_eq!(delegate.spending_limit, U256::from(1_000_000u64));
    }
}
