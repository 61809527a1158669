//! Configuration builders for tests.

use std::path::{Path, PathBuf};

use aide_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .search_roots(vec![tree.path().join("docs")])
///     .size_limit_mb(0.2)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn socket_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.daemon.socket_path = Some(path_string(path.as_ref()));
        self
    }

    pub fn search_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.config.search.roots = Some(roots.iter().map(|r| path_string(r)).collect());
        self
    }

    pub fn snapshot_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.search.snapshot_path = Some(path_string(path.as_ref()));
        self
    }

    pub fn size_limit_mb(mut self, mb: f64) -> Self {
        self.config.search.size_limit_mb = mb;
        self
    }

    pub fn snapshot_skip_mb(mut self, mb: f64) -> Self {
        self.config.search.snapshot_skip_mb = mb;
        self
    }

    pub fn warm_on_start(mut self, warm: bool) -> Self {
        self.config.search.warm_on_start = warm;
        self
    }

    pub fn disabled_tool(mut self, name: &str) -> Self {
        self.config.tools.disabled.push(name.to_string());
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
