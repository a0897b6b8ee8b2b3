//! State persistence
//!
//! The CLI keeps delegate and operation records in a single JSON file so
//! they survive restarts. Records stay flat; the only structured fields
//! are the allowlist and the task payload.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::registry::Delegate;
use crate::scheduler::AutomatedOperation;

/// Everything the agent persists between runs
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub delegates: Vec<Delegate>,
    pub operations: Vec<AutomatedOperation>,
}

impl PersistedState {
    /// Load state from a file, or start empty if the file doesn't exist
    pub async fn load_or_create(path: &str) -> std::io::Result<Self> {
        if Path::new(path).exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let state = serde_json::from_str(&content)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            return Ok(state);
        }
        Ok(Self::default())
    }

    /// Write state to a file as pretty JSON
    pub async fn save(&self, path: &str) -> std::io::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(path, content).await
    }
}
