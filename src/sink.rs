//! Durable append targets for flushed result batches.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::task::{Completion, Outcome};

/// One line of the output file. Failed items are written too, with
/// `text: null` and the failure reason in `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub id: usize,
    pub run_id: String,
    pub prompt: String,
    pub text: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub input: serde_json::Value,
}

impl OutputRecord {
    pub fn from_completion(completion: Completion, run_id: &str) -> Self {
        let (text, error) = match completion.outcome {
            Outcome::Success { text } => (Some(text), None),
            Outcome::Failure { reason } => (None, Some(reason)),
        };
        Self {
            id: completion.item.id,
            run_id: run_id.to_string(),
            prompt: completion.item.prompt,
            text,
            error,
            attempts: completion.attempts,
            completed_at: Utc::now(),
            input: completion.item.metadata,
        }
    }
}

/// Somewhere a batch of records can be appended.
///
/// Called with the result buffer's lock held, so implementations never see
/// two batches at once.
pub trait RecordSink: Send {
    fn write_batch(&mut self, batch: &[OutputRecord]) -> Result<(), StorageError>;
}

/// Appends records as newline-delimited JSON to a file.
pub struct JsonlSink {
    path: PathBuf,
    file: File,
}

impl JsonlSink {
    /// Opens `path` for appending, creating it if needed. Opening up front
    /// surfaces an unwritable destination before any request is sent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonlSink {
    fn write_batch(&mut self, batch: &[OutputRecord]) -> Result<(), StorageError> {
        // Encode the whole batch first so a bad record never leaves a partial batch on disk.
        let mut buf = Vec::new();
        for record in batch {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        self.file
            .write_all(&buf)
            .and_then(|()| self.file.sync_data())
            .map_err(|source| StorageError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::WorkItem;
    use tempfile::TempDir;

    fn completion(id: usize, outcome: Outcome) -> Completion {
        Completion {
            item: WorkItem::new(id, format!("prompt {id}")),
            outcome,
            attempts: 1,
        }
    }

    #[test]
    fn success_record_has_text_and_no_error() {
        let record = OutputRecord::from_completion(
            completion(4, Outcome::Success { text: "hi".into() }),
            "run-1",
        );
        assert_eq!(record.id, 4);
        assert_eq!(record.run_id, "run-1");
        assert_eq!(record.text.as_deref(), Some("hi"));
        assert!(record.error.is_none());

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("input").is_none());
    }

    #[test]
    fn failure_record_has_null_text() {
        let record = OutputRecord::from_completion(
            completion(
                1,
                Outcome::Failure {
                    reason: "rate limited".into(),
                },
            ),
            "run-1",
        );
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["text"].is_null());
        assert_eq!(json["error"], "rate limited");
    }

    #[test]
    fn input_metadata_is_carried_through() {
        let mut c = completion(0, Outcome::Success { text: "4".into() });
        c.item = c
            .item
            .with_metadata(serde_json::json!({"question": "2+2?", "answer": "4"}));
        let json = serde_json::to_value(OutputRecord::from_completion(c, "r")).unwrap();
        assert_eq!(json["input"]["answer"], "4");
    }

    #[test]
    fn jsonl_sink_appends_across_batches_and_reopens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");

        let mut sink = JsonlSink::open(&path).unwrap();
        let batch = |ids: &[usize]| -> Vec<OutputRecord> {
            ids.iter()
                .map(|&id| {
                    OutputRecord::from_completion(
                        completion(id, Outcome::Success { text: "t".into() }),
                        "r",
                    )
                })
                .collect()
        };
        sink.write_batch(&batch(&[0, 1])).unwrap();
        sink.write_batch(&batch(&[2])).unwrap();
        drop(sink);

        let mut sink = JsonlSink::open(&path).unwrap();
        sink.write_batch(&batch(&[3])).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let ids: Vec<usize> = contents
            .lines()
            .map(|l| serde_json::from_str::<OutputRecord>(l).unwrap().id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn open_fails_for_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = JsonlSink::open(dir.path().join("nope").join("out.jsonl"))
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::Write { .. }));
    }
}
