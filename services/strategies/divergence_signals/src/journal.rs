//! Append-only record of emitted signals

use crate::error::JournalError;
use crate::signals::SignalRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait SignalJournal: Send + Sync {
    async fn append(&self, record: &SignalRecord) -> Result<(), JournalError>;
}

/// Discards every record
#[derive(Debug, Default)]
pub struct NullJournal;

#[async_trait]
impl SignalJournal for NullJournal {
    async fn append(&self, _record: &SignalRecord) -> Result<(), JournalError> {
        Ok(())
    }
}

/// One JSON object per line. The file is reopened for every write.
#[derive(Debug, Clone)]
pub struct JsonlJournal {
    path: PathBuf,
}

impl JsonlJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SignalJournal for JsonlJournal {
    async fn append(&self, record: &SignalRecord) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalKind;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn record(timestamp: i64, kind: SignalKind) -> SignalRecord {
        SignalRecord {
            timestamp,
            symbol: "BTC/USDT".to_string(),
            timeframe: "5m".to_string(),
            kind,
            price: 93.65,
            indicators: BTreeMap::from([("rsi14".to_string(), 71.3)]),
        }
    }

    #[tokio::test]
    async fn test_jsonl_journal_appends_lines() {
        let dir = tempdir().unwrap();
        let journal = JsonlJournal::new(dir.path().join("signals.jsonl"));

        journal.append(&record(1, SignalKind::Long)).await.unwrap();
        journal.append(&record(2, SignalKind::BearishDivergence)).await.unwrap();

        let contents = std::fs::read_to_string(journal.path()).unwrap();
        let lines: Vec<SignalRecord> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(
            lines,
            vec![
                record(1, SignalKind::Long),
                record(2, SignalKind::BearishDivergence),
            ]
        );
        assert!(contents.contains("\"kind\":\"bearish_divergence\""));
    }

    #[tokio::test]
    async fn test_jsonl_journal_reports_io_errors() {
        let dir = tempdir().unwrap();
        let journal = JsonlJournal::new(dir.path().join("missing").join("signals.jsonl"));

        let err = journal.append(&record(1, SignalKind::Short)).await.unwrap_err();
        assert!(matches!(err, JournalError::Io(_)));
    }
}
