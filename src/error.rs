use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Input error: {0}")]
    Input(String),

    /// Fault in the dispatch machinery itself, not in a remote call.
    #[error("Dispatch fault: {0}")]
    Dispatch(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Failure to persist a flushed batch. Always fatal to the run.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_converts_into_batch_error() {
        let err: BatchError = StorageError::Write {
            path: PathBuf::from("out.jsonl"),
            source: std::io::Error::other("disk full"),
        }
        .into();
        assert!(matches!(err, BatchError::Storage(_)));
        assert_eq!(
            err.to_string(),
            "Storage error: failed to write out.jsonl: disk full"
        );
    }

    #[test]
    fn write_error_names_the_path() {
        let err = StorageError::Write {
            path: PathBuf::from("/tmp/out.jsonl"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to write /tmp/out.jsonl: denied");
    }
}
