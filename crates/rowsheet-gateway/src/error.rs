use std::path::PathBuf;

use rowsheet_common::RemoteError;
use thiserror::Error;

/// Failure to load or persist a [`crate::MemoryStore`] snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    Version(u32),
}

impl From<SnapshotError> for RemoteError {
    fn from(err: SnapshotError) -> Self {
        RemoteError::new(500, err.to_string())
    }
}
