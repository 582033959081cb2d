//! Append-only audit history of Act-stage records.
//!
//! The OODA controller never stores history itself; callers append each
//! cycle's [`ActionRecord`] to an [`AuditLog`]. Entries get a sequence number
//! that increases by one per append and never repeats within a log.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{ActionRecord, FairnessError, Result};

/// One persisted action record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub seq: u64,
    pub cycle_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub action: ActionRecord,
}

/// Append-only store of action records.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append a record and return the stored entry.
    async fn append(&self, cycle_id: Uuid, action: ActionRecord) -> Result<AuditEntry>;

    /// All entries in append order.
    async fn entries(&self) -> Result<Vec<AuditEntry>>;

    /// Entries for one cycle, in append order.
    async fn entries_for(&self, cycle_id: Uuid) -> Result<Vec<AuditEntry>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .filter(|e| e.cycle_id == cycle_id)
            .collect())
    }
}

/// In-memory audit log backed by a `Vec`.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> FairnessError {
    FairnessError::Audit("audit log lock poisoned".to_string())
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, cycle_id: Uuid, action: ActionRecord) -> Result<AuditEntry> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        let entry = AuditEntry {
            seq: entries.len() as u64 + 1,
            cycle_id,
            recorded_at: Utc::now(),
            action,
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.entries.lock().map_err(poisoned)?.clone())
    }
}

/// Audit log persisted as JSON Lines, one entry per line.
///
/// Appends are serialized behind an async mutex that also caches the next
/// sequence number, so concurrent appenders never interleave lines. A failed
/// append truncates the file back to its previous length, and [`open`]
/// drops any unterminated tail left by a crash mid-write.
///
/// [`open`]: JsonlAuditLog::open
#[derive(Debug)]
pub struct JsonlAuditLog {
    path: PathBuf,
    next_seq: tokio::sync::Mutex<u64>,
}

impl JsonlAuditLog {
    /// Open (or create on first append) the log at `path`, resuming its sequence.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        drop_torn_tail(&path).await?;
        let last = read_entries(&path).await?.last().map(|e| e.seq).unwrap_or(0);
        Ok(Self {
            path,
            next_seq: tokio::sync::Mutex::new(last + 1),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditLog for JsonlAuditLog {
    async fn append(&self, cycle_id: Uuid, action: ActionRecord) -> Result<AuditEntry> {
        let mut next_seq = self.next_seq.lock().await;
        let entry = AuditEntry {
            seq: *next_seq,
            cycle_id,
            recorded_at: Utc::now(),
            action,
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let len = file.metadata().await?.len();
        if let Err(e) = write_line(&mut file, &line).await {
            if let Err(rollback) = file.set_len(len).await {
                warn!(
                    event = "audit.rollback_failed",
                    path = %self.path.display(),
                    error = %rollback,
                    "partial audit line left in place"
                );
            }
            return Err(e.into());
        }

        *next_seq += 1;
        Ok(entry)
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>> {
        // Holding the lock keeps a reader from seeing a half-written line.
        let _guard = self.next_seq.lock().await;
        read_entries(&self.path).await
    }
}

async fn write_line(file: &mut tokio::fs::File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}

/// Truncate bytes after the last newline; every complete entry ends with one.
async fn drop_torn_tail(path: &Path) -> Result<()> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let keep = raw.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    if keep == raw.len() {
        return Ok(());
    }
    warn!(
        event = "audit.torn_tail_dropped",
        path = %path.display(),
        bytes = raw.len() - keep,
        "dropping unterminated audit log tail"
    );
    let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    file.set_len(keep as u64).await?;
    Ok(())
}

async fn read_entries(path: &Path) -> Result<Vec<AuditEntry>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| {
                FairnessError::Audit(format!("{}:{}: {e}", path.display(), i + 1))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;
    use crate::domain::{Decision, Severity};

    fn action(severity: Severity) -> ActionRecord {
        ActionRecord {
            decision_ref: Decision {
                severity,
                recommended_actions: severity.recommended_actions(),
                triggering_gaps: BTreeSet::new(),
            },
            executed_at: Utc::now(),
            applied: false,
            notes: "recorded".to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_log_sequences() {
        let log = MemoryAuditLog::new();
        let cycle = Uuid::new_v4();
        let first = log.append(cycle, action(Severity::Low)).await.unwrap();
        let second = log.append(Uuid::new_v4(), action(Severity::High)).await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(log.entries().await.unwrap().len(), 2);
        assert_eq!(log.entries_for(cycle).await.unwrap(), vec![first]);
    }

    #[tokio::test]
    async fn test_jsonl_log_resumes_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("log.jsonl");

        let log = JsonlAuditLog::open(&path).await.unwrap();
        assert!(log.entries().await.unwrap().is_empty());
        log.append(Uuid::new_v4(), action(Severity::Medium)).await.unwrap();
        log.append(Uuid::new_v4(), action(Severity::Critical)).await.unwrap();
        drop(log);

        let reopened = JsonlAuditLog::open(&path).await.unwrap();
        let entry = reopened.append(Uuid::new_v4(), action(Severity::None)).await.unwrap();
        assert_eq!(entry.seq, 3);

        let entries = reopened.entries().await.unwrap();
        let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(entries[1].action.decision_ref.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_jsonl_log_reports_corrupt_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();
        let err = JsonlAuditLog::open(&path).await.unwrap_err();
        assert!(matches!(err, FairnessError::Audit(_)));
        assert!(err.to_string().contains(":1:"));
    }

    #[tokio::test]
    async fn test_jsonl_log_drops_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let log = JsonlAuditLog::open(&path).await.unwrap();
        log.append(Uuid::new_v4(), action(Severity::Low)).await.unwrap();
        drop(log);

        let mut raw = std::fs::read(&path).unwrap();
        raw.extend_from_slice(b"{\"seq\":2,\"cycle_id\":\"");
        std::fs::write(&path, &raw).unwrap();

        let reopened = JsonlAuditLog::open(&path).await.unwrap();
        let entry = reopened.append(Uuid::new_v4(), action(Severity::High)).await.unwrap();
        assert_eq!(entry.seq, 2);
        let seqs: Vec<u64> = reopened.entries().await.unwrap().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    async fn append_concurrently(log: Arc<dyn AuditLog>, n: u64) -> Vec<u64> {
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let log = Arc::clone(&log);
                let severity = if i % 2 == 0 { Severity::Low } else { Severity::High };
                tokio::spawn(async move { log.append(Uuid::new_v4(), action(severity)).await })
            })
            .collect();
        let mut seqs = Vec::new();
        for handle in handles {
            seqs.push(handle.await.unwrap().unwrap().seq);
        }
        seqs.sort_unstable();
        seqs
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_get_unique_sequences() {
        const N: u64 = 64;
        let dir = tempfile::tempdir().unwrap();
        let jsonl: Arc<dyn AuditLog> =
            Arc::new(JsonlAuditLog::open(dir.path().join("log.jsonl")).await.unwrap());
        let memory: Arc<dyn AuditLog> = Arc::new(MemoryAuditLog::new());

        for log in [jsonl, memory] {
            let seqs = append_concurrently(Arc::clone(&log), N).await;
            assert_eq!(seqs, (1..=N).collect::<Vec<_>>());

            let entries = log.entries().await.unwrap();
            assert_eq!(entries.len() as u64, N);
            let stored: Vec<u64> = entries.iter().map(|e| e.seq).collect();
            assert_eq!(stored, (1..=N).collect::<Vec<_>>());
        }
    }
}
