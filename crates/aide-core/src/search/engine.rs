//! The process-wide search engine: one live index, its snapshot, and the
//! indexing pipeline that fills it.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use aide_config::{SearchConfig, megabytes_to_bytes};

use super::index::{IndexStats, SearchDocument, SearchHit, SearchIndex, SearchOptions};
use super::snapshot::{load_snapshot, save_snapshot, snapshot_size};
use super::walker::{CandidateFile, collect_files};

/// Files read and added to the index per step.
pub const BATCH_SIZE: usize = 10;

/// Indexing progress, reported each time `percent` changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexProgress {
    pub processed: usize,
    pub total: usize,
    pub percent: u8,
}

/// Outcome of one [`add_documents`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSummary {
    /// Files that passed the directory, extension and size policy.
    pub candidates: usize,
    pub indexed: usize,
    /// Candidates that could not be read.
    pub failed: usize,
}

/// Why the live index was built rather than loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum RebuildReason {
    NoSnapshot,
    SnapshotTooLarge { size: u64, threshold: u64 },
    SnapshotUnreadable { error: String },
    Requested,
}

/// Where the live index came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum IndexOrigin {
    Snapshot,
    Built {
        reason: RebuildReason,
        summary: AddSummary,
    },
}

/// Engine state for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum EngineStatus {
    Uninitialized,
    /// The index is being loaded, built, or queried.
    Busy,
    Ready {
        stats: IndexStats,
        origin: IndexOrigin,
        since: DateTime<Utc>,
    },
}

struct LiveIndex {
    index: Arc<SearchIndex>,
    origin: IndexOrigin,
    since: DateTime<Utc>,
}

/// Owner of the single live [`SearchIndex`].
///
/// The mutex around the live slot also serializes initialization, rebuilds
/// and the lookup step of searches, so a query never observes an index that
/// is still being filled.
pub struct SearchEngine {
    roots: Vec<PathBuf>,
    size_limit_mb: f64,
    snapshot_path: PathBuf,
    snapshot_skip_bytes: u64,
    live: Mutex<Option<LiveIndex>>,
}

impl SearchEngine {
    pub fn new(roots: Vec<PathBuf>, snapshot_path: impl Into<PathBuf>) -> Self {
        let defaults = SearchConfig::default();
        Self {
            roots,
            size_limit_mb: defaults.size_limit_mb,
            snapshot_path: snapshot_path.into(),
            snapshot_skip_bytes: defaults.snapshot_skip_bytes(),
            live: Mutex::new(None),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.resolved_roots(), config.resolved_snapshot_path())
            .with_size_limit_mb(config.size_limit_mb)
            .with_snapshot_skip_bytes(config.snapshot_skip_bytes())
    }

    pub fn with_size_limit_mb(mut self, size_limit_mb: f64) -> Self {
        self.size_limit_mb = size_limit_mb;
        self
    }

    pub fn with_snapshot_skip_bytes(mut self, bytes: u64) -> Self {
        self.snapshot_skip_bytes = bytes;
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn snapshot_path(&self) -> &std::path::Path {
        &self.snapshot_path
    }

    /// Make an index live, loading the snapshot when it is small enough.
    ///
    /// A live index is returned as-is. An unreadable or oversized snapshot
    /// leads to a fresh build, which then overwrites the snapshot.
    pub async fn initialize(&self) -> Arc<SearchIndex> {
        self.initialize_with_progress(&mut |_| {}).await
    }

    pub async fn initialize_with_progress(
        &self,
        progress: &mut (dyn FnMut(IndexProgress) + Send),
    ) -> Arc<SearchIndex> {
        let mut live = self.live.lock().await;
        if let Some(current) = live.as_ref() {
            return Arc::clone(&current.index);
        }

        let next = match self.try_load().await {
            Ok(index) => {
                info!(
                    path = %self.snapshot_path.display(),
                    documents = index.len(),
                    "Loaded search index snapshot"
                );
                LiveIndex {
                    index: Arc::new(index),
                    origin: IndexOrigin::Snapshot,
                    since: Utc::now(),
                }
            }
            Err(reason) => self.build(reason, progress).await,
        };

        let index = Arc::clone(&next.index);
        *live = Some(next);
        index
    }

    /// Discard the live index and build a new one from disk.
    pub async fn rebuild(&self) -> AddSummary {
        self.rebuild_with_progress(&mut |_| {}).await
    }

    pub async fn rebuild_with_progress(
        &self,
        progress: &mut (dyn FnMut(IndexProgress) + Send),
    ) -> AddSummary {
        let mut live = self.live.lock().await;
        let next = self.build(RebuildReason::Requested, progress).await;
        let summary = match &next.origin {
            IndexOrigin::Built { summary, .. } => *summary,
            IndexOrigin::Snapshot => AddSummary::default(),
        };
        *live = Some(next);
        summary
    }

    /// Query the live index, initializing it first if needed.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchHit> {
        let index = self.initialize().await;
        index.search(query, options)
    }

    pub async fn is_initialized(&self) -> bool {
        self.live.lock().await.is_some()
    }

    /// Non-blocking status probe.
    pub fn status(&self) -> EngineStatus {
        match self.live.try_lock() {
            Err(_) => EngineStatus::Busy,
            Ok(live) => match live.as_ref() {
                None => EngineStatus::Uninitialized,
                Some(current) => EngineStatus::Ready {
                    stats: current.index.stats(),
                    origin: current.origin.clone(),
                    since: current.since,
                },
            },
        }
    }

    async fn try_load(&self) -> Result<SearchIndex, RebuildReason> {
        let size = match snapshot_size(&self.snapshot_path).await {
            Ok(Some(size)) => size,
            Ok(None) => return Err(RebuildReason::NoSnapshot),
            Err(e) => {
                warn!(error = %e, "Cannot inspect search index snapshot");
                return Err(RebuildReason::SnapshotUnreadable {
                    error: e.to_string(),
                });
            }
        };

        if size >= self.snapshot_skip_bytes {
            info!(
                size,
                threshold = self.snapshot_skip_bytes,
                "Search index snapshot too large, rebuilding"
            );
            return Err(RebuildReason::SnapshotTooLarge {
                size,
                threshold: self.snapshot_skip_bytes,
            });
        }

        load_snapshot(&self.snapshot_path).await.map_err(|e| {
            warn!(error = %e, "Discarding unusable search index snapshot");
            RebuildReason::SnapshotUnreadable {
                error: e.to_string(),
            }
        })
    }

    async fn build(
        &self,
        reason: RebuildReason,
        progress: &mut (dyn FnMut(IndexProgress) + Send),
    ) -> LiveIndex {
        info!(?reason, roots = self.roots.len(), "Building search index");
        let mut index = SearchIndex::new();
        let summary = add_documents(&mut index, &self.roots, self.size_limit_mb, progress).await;

        if let Err(e) = save_snapshot(&self.snapshot_path, &index).await {
            warn!(error = %e, "Failed to write search index snapshot");
        }

        LiveIndex {
            index: Arc::new(index),
            origin: IndexOrigin::Built { reason, summary },
            since: Utc::now(),
        }
    }
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("roots", &self.roots)
            .field("size_limit_mb", &self.size_limit_mb)
            .field("snapshot_path", &self.snapshot_path)
            .finish_non_exhaustive()
    }
}

/// Walk `roots` and add every eligible file to `index`.
///
/// Files are read [`BATCH_SIZE`] at a time, concurrently within a batch, and
/// each batch is added in one step. Unreadable files are logged and counted
/// in [`AddSummary::failed`].
pub async fn add_documents(
    index: &mut SearchIndex,
    roots: &[PathBuf],
    size_limit_mb: f64,
    progress: &mut (dyn FnMut(IndexProgress) + Send),
) -> AddSummary {
    let files = collect_files(roots, megabytes_to_bytes(size_limit_mb)).await;
    let total = files.len();
    let mut summary = AddSummary {
        candidates: total,
        ..AddSummary::default()
    };
    debug!(files = total, "Collected files to index");

    if total == 0 {
        progress(IndexProgress {
            processed: 0,
            total: 0,
            percent: 100,
        });
        return summary;
    }

    let mut processed = 0;
    let mut last_percent = None;
    for batch in files.chunks(BATCH_SIZE) {
        let documents = read_batch(batch, &mut summary).await;
        summary.indexed += documents.len();
        index.add_all(documents);

        processed += batch.len();
        let percent = u8::try_from(processed * 100 / total).unwrap_or(100);
        if last_percent != Some(percent) {
            last_percent = Some(percent);
            debug!(processed, total, percent, "Indexing progress");
            progress(IndexProgress {
                processed,
                total,
                percent,
            });
        }
    }

    info!(
        indexed = summary.indexed,
        failed = summary.failed,
        "Search index populated"
    );
    summary
}

async fn read_batch(batch: &[CandidateFile], summary: &mut AddSummary) -> Vec<SearchDocument> {
    let reads: Vec<_> = batch
        .iter()
        .map(|file| {
            let path = file.path.clone();
            tokio::spawn(async move {
                let bytes = tokio::fs::read(&path).await;
                (path, bytes)
            })
        })
        .collect();

    let mut documents = Vec::with_capacity(batch.len());
    for read in reads {
        match read.await {
            Ok((path, Ok(bytes))) => documents.push(SearchDocument::from_file(&path, &bytes)),
            Ok((path, Err(e))) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                summary.failed += 1;
            }
            Err(e) => {
                warn!(error = %e, "File read task failed");
                summary.failed += 1;
            }
        }
    }
    documents
}
