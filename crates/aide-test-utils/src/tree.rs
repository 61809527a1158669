//! Temporary directory trees for filesystem tests.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temp directory that is removed when dropped, even on panic.
pub struct TestTree {
    dir: TempDir,
}

impl TestTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create a directory, with parents.
    pub fn dir(&self, relative: &str) -> PathBuf {
        let path = self.path().join(relative);
        std::fs::create_dir_all(&path).expect("failed to create test dir");
        path
    }

    /// Write a file, creating parent directories.
    pub fn file(&self, relative: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.prepare(relative);
        std::fs::write(&path, contents).expect("failed to write test file");
        path
    }

    /// Create a file of exactly `size` bytes without writing them.
    ///
    /// The file is sparse where the platform allows, so very large sizes
    /// cost no disk space.
    pub fn sized_file(&self, relative: &str, size: u64) -> PathBuf {
        let path = self.prepare(relative);
        let file = std::fs::File::create(&path).expect("failed to create test file");
        file.set_len(size).expect("failed to size test file");
        path
    }

    fn prepare(&self, relative: &str) -> PathBuf {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        path
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}
