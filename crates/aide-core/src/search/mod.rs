//! Local file search: a full-text index over the user's documents, persisted
//! between runs as a snapshot.

pub mod engine;
pub mod index;
pub mod snapshot;
pub mod walker;

use std::path::{Path, PathBuf};

pub use engine::{
    AddSummary, BATCH_SIZE, EngineStatus, IndexOrigin, IndexProgress, RebuildReason, SearchEngine,
    add_documents,
};
pub use index::{
    CATEGORY_FILE, IndexStats, SearchDocument, SearchHit, SearchIndex, SearchOptions, tokenize,
};
pub use snapshot::{SNAPSHOT_FORMAT_VERSION, load_snapshot, save_snapshot, snapshot_size};

/// Search and snapshot errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt index snapshot {}: {reason}", .path.display())]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("failed to encode index snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SearchError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
