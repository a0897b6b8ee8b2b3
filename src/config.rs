//! Configuration for the delegation agent

use serde::{Deserialize, Serialize};

/// Policy applied when a delegate's `allowed_operations` set is empty.
///
/// The deployed contract only denies operations once restrictions have been
/// explicitly extended, so `EmptyAllowsAll` is the default. Product can flip
/// this to `EmptyDeniesAll` without code changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowlistPolicy {
    /// An empty allowlist permits every operation tag.
    EmptyAllowsAll,
    /// An empty allowlist permits nothing.
    EmptyDeniesAll,
}

impl AllowlistPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            AllowlistPolicy::EmptyAllowsAll => "empty_allows_all",
            AllowlistPolicy::EmptyDeniesAll => "empty_denies_all",
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// How an empty allowlist is interpreted by the authorization gate
    pub allowlist_policy: AllowlistPolicy,
    /// Deadline for a single forwarder call (milliseconds)
    pub forward_timeout_ms: u64,
    /// Scheduler tick interval (milliseconds)
    pub tick_interval_ms: u64,
    /// Path to the audit log file (JSONL)
    pub audit_log_path: Option<String>,
    /// Path to persist delegate and operation state across runs
    pub state_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allowlist_policy: AllowlistPolicy::EmptyAllowsAll,
            forward_timeout_ms: 30_000,
            tick_interval_ms: 5_000,
            audit_log_path: Some("audit.jsonl".to_string()),
            state_file: Some("delegation-state.json".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_allow_all() {
        let config = Config::default();
        assert_eq!(config.allowlist_policy, AllowlistPolicy::EmptyAllowsAll);
        assert_eq!(config.forward_timeout_ms, 30_000);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = Config {
            allowlist_policy: AllowlistPolicy::EmptyDeniesAll,
            forward_timeout_ms: 1_000,
            tick_interval_ms: 250,
            audit_log_path: None,
            state_file: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.allowlist_policy, AllowlistPolicy::EmptyDeniesAll);
        assert_eq!(parsed.forward_timeout_ms, 1_000);
        assert!(parsed.audit_log_path.is_none());
    }
}
