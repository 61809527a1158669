//! Filesystem walk that selects which files get indexed.

use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

/// Directory names never descended into, in addition to hidden directories.
pub const EXCLUDED_DIRS: &[&str] = &["node_modules", ".git", "dist", "build"];

/// File extensions worth indexing, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "txt", "md", "doc", "docx", "pdf", "rtf", "json", "csv", "xls", "xlsx", "ppt", "pptx", "odt",
    "ods", "odp",
];

/// A file selected for indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Whether a directory with this name is skipped.
pub fn is_excluded_dir(name: &str) -> bool {
    name.starts_with('.') || EXCLUDED_DIRS.contains(&name)
}

/// Whether a file's extension is on the allow-list.
pub fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
}

/// Collect every indexable file under `roots`.
///
/// Missing roots are ignored. Directories that cannot be listed and entries
/// that cannot be stat'ed are logged and skipped; they never abort the walk.
/// Symlinks are not followed. Entries are visited in name order so the
/// result is stable across runs.
pub async fn collect_files(roots: &[PathBuf], size_limit_bytes: u64) -> Vec<CandidateFile> {
    let mut files = Vec::new();

    for root in roots {
        match tokio::fs::metadata(root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                debug!(root = %root.display(), "Search root is not a directory");
                continue;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(root = %root.display(), "Search root does not exist");
                continue;
            }
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Cannot access search root");
                continue;
            }
        }

        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            let entries = match read_sorted(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping inaccessible directory");
                    continue;
                }
            };

            let mut subdirs = Vec::new();
            for entry in entries {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().into_owned();
                let file_type = match entry.file_type().await {
                    Ok(ft) => ft,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Cannot stat entry");
                        continue;
                    }
                };

                if file_type.is_dir() {
                    if is_excluded_dir(&name) {
                        trace!(dir = %path.display(), "Excluded directory");
                    } else {
                        subdirs.push(path);
                    }
                    continue;
                }
                if !file_type.is_file() || !has_allowed_extension(&path) {
                    continue;
                }

                let size = match entry.metadata().await {
                    Ok(meta) => meta.len(),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Cannot stat file");
                        continue;
                    }
                };
                if size > size_limit_bytes {
                    debug!(path = %path.display(), size, "File exceeds size limit");
                    continue;
                }
                files.push(CandidateFile { path, size });
            }
            // Reversed so the stack pops subdirectories in name order.
            pending.extend(subdirs.into_iter().rev());
        }
    }

    files
}

async fn read_sorted(dir: &Path) -> std::io::Result<Vec<tokio::fs::DirEntry>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        entries.push(entry);
    }
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aide_test_utils::TestTree;
    use pretty_assertions::assert_eq;

    fn names(files: &[CandidateFile], tree: &TestTree) -> Vec<String> {
        files
            .iter()
            .map(|f| {
                f.path
                    .strip_prefix(tree.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_extension_allow_list() {
        assert!(has_allowed_extension(Path::new("notes.txt")));
        assert!(has_allowed_extension(Path::new("Report.PDF")));
        assert!(has_allowed_extension(Path::new("deck.pptx")));
        assert!(!has_allowed_extension(Path::new("setup.exe")));
        assert!(!has_allowed_extension(Path::new("README")));
        assert!(!has_allowed_extension(Path::new("archive.txt.gz")));
    }

    #[test]
    fn test_excluded_dirs() {
        assert!(is_excluded_dir(".cache"));
        assert!(is_excluded_dir("node_modules"));
        assert!(is_excluded_dir("build"));
        assert!(!is_excluded_dir("taxes"));
    }

    #[tokio::test]
    async fn test_walk_applies_policy() {
        let tree = TestTree::new();
        tree.file("a.txt", "alpha");
        tree.file("b.exe", "binary");
        tree.file("notes/todo.md", "todo");
        tree.file("notes/.hidden/secret.txt", "hidden");
        tree.file("node_modules/pkg/readme.md", "dep");
        tree.file("dist/out.json", "{}");
        tree.file("build/log.txt", "log");
        tree.file(".git/HEAD.txt", "ref");
        tree.file("Sheets/Q1.XLSX", "cells");

        let files = collect_files(&[tree.path().to_path_buf()], 1024 * 1024).await;

        assert_eq!(names(&files, &tree), vec!["a.txt", "Sheets/Q1.XLSX", "notes/todo.md"]);
    }

    #[tokio::test]
    async fn test_walk_respects_size_limit() {
        let tree = TestTree::new();
        tree.sized_file("small.txt", 1024);
        tree.sized_file("exact.txt", 2048);
        tree.sized_file("large.txt", 2049);

        let files = collect_files(&[tree.path().to_path_buf()], 2048).await;

        assert_eq!(names(&files, &tree), vec!["exact.txt", "small.txt"]);
        assert_eq!(files[0].size, 2048);
    }

    #[tokio::test]
    async fn test_missing_roots_are_ignored() {
        let tree = TestTree::new();
        tree.file("a.txt", "alpha");

        let roots = vec![tree.path().join("does-not-exist"), tree.path().to_path_buf()];
        let files = collect_files(&roots, 1024).await;

        assert_eq!(files.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_directory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let tree = TestTree::new();
        tree.file("open/a.txt", "alpha");
        tree.file("locked/b.txt", "beta");
        let locked = tree.path().join("locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let files = collect_files(&[tree.path().to_path_buf()], 1024).await;

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        // Root ignores permission bits, so only assert the readable file is found.
        assert!(names(&files, &tree).contains(&"open/a.txt".to_string()));
    }
}
