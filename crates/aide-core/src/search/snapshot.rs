//! Persisted index snapshots.
//!
//! A snapshot is the JSON encoding of a [`SearchIndex`] wrapped in a small
//! envelope with a format version. Writes go to a sibling temp file that is
//! renamed over the target, so a crash mid-write leaves the previous
//! snapshot intact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SearchError;
use super::index::SearchIndex;

/// Bumped whenever the encoding of [`SearchIndex`] changes.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format_version: u32,
    created_at: DateTime<Utc>,
    index: &'a SearchIndex,
}

#[derive(Deserialize)]
struct Snapshot {
    format_version: u32,
    created_at: DateTime<Utc>,
    index: SearchIndex,
}

/// Size of the snapshot in bytes, or `None` if there is no snapshot.
pub async fn snapshot_size(path: &Path) -> Result<Option<u64>, SearchError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SearchError::io(path, e)),
    }
}

/// Read and decode a snapshot.
pub async fn load_snapshot(path: &Path) -> Result<SearchIndex, SearchError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SearchError::io(path, e))?;
    let snapshot = decode_envelope(&bytes).map_err(|reason| SearchError::CorruptSnapshot {
        path: path.to_path_buf(),
        reason,
    })?;
    debug!(
        path = %path.display(),
        created_at = %snapshot.created_at,
        age_secs = (Utc::now() - snapshot.created_at).num_seconds(),
        documents = snapshot.index.len(),
        "Decoded search index snapshot"
    );
    Ok(snapshot.index)
}

/// Decode snapshot bytes. Errors carry a human-readable reason.
pub fn decode_snapshot(bytes: &[u8]) -> Result<SearchIndex, String> {
    decode_envelope(bytes).map(|snapshot| snapshot.index)
}

fn decode_envelope(bytes: &[u8]) -> Result<Snapshot, String> {
    let snapshot: Snapshot = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(format!(
            "unsupported format version {} (expected {SNAPSHOT_FORMAT_VERSION})",
            snapshot.format_version
        ));
    }
    Ok(snapshot)
}

/// Encode and write a snapshot, replacing any previous one.
pub async fn save_snapshot(path: &Path, index: &SearchIndex) -> Result<u64, SearchError> {
    let bytes = serde_json::to_vec(&SnapshotRef {
        format_version: SNAPSHOT_FORMAT_VERSION,
        created_at: Utc::now(),
        index,
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SearchError::io(parent, e))?;
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| SearchError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| SearchError::io(path, e))?;

    debug!(path = %path.display(), bytes = bytes.len(), "Index snapshot written");
    Ok(bytes.len() as u64)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
