use std::path::PathBuf;
use thiserror::Error;

/// The main error type for lsconv operations.
///
/// Only a handful of variants are fatal for a whole run: an unusable labeling
/// config ([`ConvertError::Config`]), an unreadable input root, or an
/// unwritable destination. Everything else (unresolvable geometry, corrupt
/// brush masks, BIO tag conflicts) is scoped to a single task or result and
/// surfaces as a warning in the [`EmissionReport`](crate::EmissionReport)
/// rather than aborting the stream.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid labeling config: {0}")]
    Config(String),

    #[error("failed to parse task JSON from {path}: {source}")]
    TaskParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {format} output to {path}: {message}")]
    Write {
        format: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("task {task_id}: cannot resolve image dimensions for '{reference}'")]
    Geometry { task_id: i64, reference: String },

    #[error("invalid brush mask: {0}")]
    MaskDecode(String),

    #[error("task {task_id}: overlapping spans both cover token '{token}' ({left} vs {right})")]
    Conflict {
        task_id: i64,
        token: String,
        left: String,
        right: String,
    },
}

impl ConvertError {
    /// Helper for write-side failures that carry a path and a free-form message.
    pub fn write(
        format: &'static str,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        ConvertError::Write {
            format,
            path: path.into(),
            message: message.into(),
        }
    }
}
