//! Audit log for authorization attempts
//!
//! Every attempt through the gate is appended to a JSONL file, whether it
//! committed or was blocked. Logging never blocks an attempt; a write
//! failure is reported and swallowed.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Entry in the audit log
#[derive(Debug, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub delegate: Address,
    pub operation_tag: String,
    pub target: Address,
    pub value: U256,
    /// `committed`, `blocked`, `forward_failed` or `forward_timeout`
    pub status: &'static str,
    /// Error text for non-committed attempts
    pub detail: Option<String>,
    /// Spent amount after a committed attempt
    pub spent_amount: Option<U256>,
}

/// Writer for audit log entries
struct AuditLogWriter {
    path: PathBuf,
}

impl AuditLogWriter {
    fn write(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

/// Append-only JSONL audit log
#[derive(Clone)]
pub struct AuditLog {
    writer: Arc<Mutex<AuditLogWriter>>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(AuditLogWriter { path: path.into() })),
        }
    }

    pub async fn record(&self, entry: &AuditEntry) {
        let writer = self.writer.lock().await;
        if let Err(e) = writer.write(entry) {
            tracing::warn!(error = %e, "Failed to write audit log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn records_entries_as_jsonl() {
        let temp_file = NamedTempFile::new().unwrap();
        let log = AuditLog::new(temp_file.path());

        log.record(&AuditEntry {
            timestamp: Utc::now(),
            delegate: Address::repeat_byte(1),
            operation_tag: "swap".to_string(),
            target: Address::repeat_byte(2),
            value: U256::from(100),
            status: "committed",
            detail: None,
            spent_amount: Some(U256::from(100)),
        })
        .await;

        log.record(&AuditEntry {
            timestamp: Utc::now(),
            delegate: Address::repeat_byte(1),
            operation_tag: "swap".to_string(),
            target: Address::repeat_byte(2),
            value: U256::from(100),
            status: "blocked",
            detail: Some("quota exceeded".to_string()),
            spent_amount: None,
        })
        .await;

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("committed"));
        assert!(content.contains("blocked"));
        assert!(content.contains("quota exceeded"));
    }
}
