//! Relay journal: one record per relayed request, kept in a ring buffer and
//! appended to a JSONL file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::translate::usage::UsageCounter;
use crate::translate::Dialect;

const MAX_JOURNAL_RECORDS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    /// The stream ended before the backend sent a terminal event.
    Truncated,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRecord {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub source: Dialect,
    pub backend: Dialect,
    pub model: String,
    pub upstream_model: String,
    pub converted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub stream: bool,
    pub status: u16,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageCounter>,
    #[serde(default)]
    pub malformed_frames: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub builtin_tool_calls: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayRecord {
    pub fn new(
        request_id: impl Into<String>,
        source: Dialect,
        backend: Dialect,
        model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        Self {
            timestamp: Utc::now(),
            request_id: request_id.into(),
            source,
            backend,
            upstream_model: model.clone(),
            model,
            converted: false,
            fallback_reason: None,
            stream: false,
            status: 200,
            outcome: Outcome::Completed,
            usage: None,
            malformed_frames: 0,
            builtin_tool_calls: BTreeMap::new(),
            error: None,
        }
    }

    pub fn failed(mut self, status: u16, error: impl Into<String>) -> Self {
        self.status = status;
        self.outcome = Outcome::Failed;
        self.error = Some(error.into());
        self
    }
}

/// Ring buffer of relay records persisted to JSONL
pub struct RelayJournal {
    records: VecDeque<RelayRecord>,
    file_path: std::path::PathBuf,
    writer: Option<BufWriter<File>>,
}

impl RelayJournal {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut records = VecDeque::with_capacity(MAX_JOURNAL_RECORDS);

        if file_path.exists() {
            let file = File::open(&file_path)?;
            let reader = BufReader::new(file);
            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Ok(record) = serde_json::from_str::<RelayRecord>(&line) {
                    if records.len() >= MAX_JOURNAL_RECORDS {
                        records.pop_front();
                    }
                    records.push_back(record);
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;
        let writer = BufWriter::new(file);

        Ok(Self {
            records,
            file_path,
            writer: Some(writer),
        })
    }

    pub fn record(&mut self, record: RelayRecord) {
        if let Some(ref mut writer) = self.writer {
            if let Ok(json) = serde_json::to_string(&record) {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
        if self.records.len() >= MAX_JOURNAL_RECORDS {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn recent(&self, limit: usize) -> Vec<RelayRecord> {
        self.records.iter().rev().take(limit).cloned().collect()
    }

    /// Rewrite the file so it holds only the records still in the buffer.
    pub fn compact(&mut self) -> std::io::Result<()> {
        self.writer = None;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.file_path)?;
        let mut writer = BufWriter::new(file);
        for record in &self.records {
            if let Ok(json) = serde_json::to_string(record) {
                writeln!(writer, "{}", json)?;
            }
        }
        writer.flush()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }
}

#[derive(Clone)]
pub struct SharedJournal(Arc<Mutex<RelayJournal>>);

impl SharedJournal {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(RelayJournal::new(file_path)?))))
    }

    pub fn record(&self, record: RelayRecord) {
        tracing::info!(
            request_id = %record.request_id,
            source = %record.source,
            backend = %record.backend,
            model = %record.model,
            converted = record.converted,
            status = record.status,
            outcome = ?record.outcome,
            "relay finished"
        );
        if let Ok(mut journal) = self.0.lock() {
            journal.record(record);
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<RelayRecord> {
        self.0.lock().map(|j| j.recent(limit)).unwrap_or_default()
    }

    pub fn compact(&self) -> std::io::Result<()> {
        match self.0.lock() {
            Ok(mut journal) => journal.compact(),
            Err(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str) -> RelayRecord {
        RelayRecord::new(id, Dialect::Chat, Dialect::Responses, "gpt-5")
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal").join("relay.jsonl");

        let journal = SharedJournal::new(&path).unwrap();
        let mut first = record("req-1");
        first.converted = true;
        first.usage = Some(UsageCounter {
            prompt_tokens: 5,
            completion_tokens: 2,
            total_tokens: 7,
            cached_tokens: 0,
        });
        journal.record(first);
        journal.record(record("req-2").failed(502, "connection reset"));

        let reopened = SharedJournal::new(&path).unwrap();
        let recent = reopened.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].request_id, "req-2");
        assert_eq!(recent[0].outcome, Outcome::Failed);
        assert_eq!(recent[1].usage.map(|u| u.total_tokens), Some(7));
    }

    #[test]
    fn test_compact_rewrites_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        let journal = SharedJournal::new(&path).unwrap();
        journal.record(record("req-1"));
        journal.compact().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("req-1"));
    }
}
