#![deny(unsafe_code)]

//! Configuration loading and validation for aide.
//!
//! Loads TOML configuration files and validates them. Provides the
//! [`AppConfig`] type as the central configuration structure shared by the
//! daemon, the CLI, and the search index engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon configuration.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// File search index configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Tool exposure configuration.
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Configuration for the core daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address the daemon advertises for control-plane connections.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port the daemon advertises.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Unix socket path for the IPC API. Defaults to `/tmp/aide.sock`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            socket_path: None,
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    9100
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// File search index configuration.
///
/// ## TOML Example
///
/// ```toml
/// [search]
/// roots = ["/home/alice/Documents", "/home/alice/notes"]
/// size_limit_mb = 10.0
/// snapshot_path = "/var/lib/aide/search-index.json"
/// snapshot_skip_mb = 20.0
/// warm_on_start = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Directories to index. When unset, the well-known user directories
    /// (documents, downloads, desktop, pictures, music, videos) are used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<Vec<String>>,

    /// Files larger than this many megabytes are not indexed.
    #[serde(default = "default_size_limit_mb")]
    pub size_limit_mb: f64,

    /// Where the serialized index snapshot is stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,

    /// Snapshots at or above this size are ignored and the index is rebuilt.
    #[serde(default = "default_snapshot_skip_mb")]
    pub snapshot_skip_mb: f64,

    /// Build or load the index when the daemon starts instead of on first search.
    #[serde(default)]
    pub warm_on_start: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            roots: None,
            size_limit_mb: default_size_limit_mb(),
            snapshot_path: None,
            snapshot_skip_mb: default_snapshot_skip_mb(),
            warm_on_start: false,
        }
    }
}

fn default_size_limit_mb() -> f64 {
    10.0
}

fn default_snapshot_skip_mb() -> f64 {
    20.0
}

/// File name of the snapshot inside the per-user data directory.
const SNAPSHOT_FILE_NAME: &str = "search-index.json";

impl SearchConfig {
    /// The directories the indexer walks.
    ///
    /// Configured roots are returned verbatim. Otherwise the platform's
    /// well-known user directories are resolved; any the platform does not
    /// define are left out.
    pub fn resolved_roots(&self) -> Vec<PathBuf> {
        match &self.roots {
            Some(roots) => roots.iter().map(PathBuf::from).collect(),
            None => [
                dirs::document_dir(),
                dirs::download_dir(),
                dirs::desktop_dir(),
                dirs::picture_dir(),
                dirs::audio_dir(),
                dirs::video_dir(),
            ]
            .into_iter()
            .flatten()
            .collect(),
        }
    }

    /// The effective snapshot location.
    pub fn resolved_snapshot_path(&self) -> PathBuf {
        if let Some(path) = &self.snapshot_path {
            return PathBuf::from(path);
        }
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("aide")
            .join(SNAPSHOT_FILE_NAME)
    }

    /// Snapshot skip threshold in bytes.
    pub fn snapshot_skip_bytes(&self) -> u64 {
        megabytes_to_bytes(self.snapshot_skip_mb)
    }
}

/// Convert a (possibly fractional) megabyte figure to bytes.
pub fn megabytes_to_bytes(mb: f64) -> u64 {
    (mb * 1024.0 * 1024.0) as u64
}

/// Tool exposure configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Tool names that are registered but never offered to the model.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.listen_port == 0 {
            return Err(ConfigError::Validation(
                "daemon.listen_port must be non-zero".to_string(),
            ));
        }
        if self.daemon.listen_addr.is_empty() {
            return Err(ConfigError::Validation(
                "daemon.listen_addr must not be empty".to_string(),
            ));
        }
        if let Some(socket) = &self.daemon.socket_path
            && socket.is_empty()
        {
            return Err(ConfigError::Validation(
                "daemon.socket_path must not be empty when set".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        // Search limits
        if self.search.size_limit_mb.is_nan() || self.search.size_limit_mb <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "search.size_limit_mb must be positive, got {}",
                self.search.size_limit_mb
            )));
        }
        if self.search.snapshot_skip_mb.is_nan() || self.search.snapshot_skip_mb <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "search.snapshot_skip_mb must be positive, got {}",
                self.search.snapshot_skip_mb
            )));
        }
        if let Some(roots) = &self.search.roots {
            for (i, root) in roots.iter().enumerate() {
                if root.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "search.roots[{i}] must not be empty"
                    )));
                }
            }
        }

        for (i, name) in self.tools.disabled.iter().enumerate() {
            if name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "tools.disabled[{i}] must not be empty"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.daemon.listen_addr, "127.0.0.1");
        assert_eq!(config.daemon.listen_port, 9100);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.search.size_limit_mb, 10.0);
        assert_eq!(config.search.snapshot_skip_mb, 20.0);
        assert!(!config.search.warm_on_start);
        assert!(config.tools.disabled.is_empty());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.daemon.listen_port, 9100);
        assert!(config.search.roots.is_none());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [daemon]
            listen_addr = "0.0.0.0"
            listen_port = 8080
            socket_path = "/run/aide/aide.sock"

            [logging]
            level = "debug"

            [search]
            roots = ["/srv/docs", "/srv/notes"]
            size_limit_mb = 0.2
            snapshot_path = "/var/lib/aide/index.json"
            snapshot_skip_mb = 5.0
            warm_on_start = true

            [tools]
            disabled = ["file_search"]
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.daemon.listen_addr, "0.0.0.0");
        assert_eq!(config.daemon.listen_port, 8080);
        assert_eq!(
            config.daemon.socket_path.as_deref(),
            Some("/run/aide/aide.sock")
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.search.resolved_roots(),
            vec![PathBuf::from("/srv/docs"), PathBuf::from("/srv/notes")]
        );
        assert_eq!(config.search.size_limit_mb, 0.2);
        assert_eq!(
            config.search.resolved_snapshot_path(),
            PathBuf::from("/var/lib/aide/index.json")
        );
        assert_eq!(config.search.snapshot_skip_bytes(), 5 * 1024 * 1024);
        assert!(config.search.warm_on_start);
        assert_eq!(config.tools.disabled, vec!["file_search".to_string()]);
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let toml = r#"
            [daemon]
            listen_port = 0
        "#;
        let result = AppConfig::parse(toml);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_empty_addr() {
        let toml = r#"
            [daemon]
            listen_addr = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_socket_path() {
        let toml = r#"
            [daemon]
            socket_path = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_log_level() {
        let toml = r#"
            [logging]
            level = "verbose"
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_validation_rejects_non_positive_size_limit() {
        let toml = r#"
            [search]
            size_limit_mb = 0.0
        "#;
        assert!(AppConfig::parse(toml).is_err());

        let toml = r#"
            [search]
            size_limit_mb = -1.0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_non_positive_skip_threshold() {
        let toml = r#"
            [search]
            snapshot_skip_mb = 0.0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_root() {
        let toml = r#"
            [search]
            roots = ["/srv/docs", ""]
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("search.roots[1]"));
    }

    #[test]
    fn test_validation_rejects_empty_disabled_tool() {
        let toml = r#"
            [tools]
            disabled = [""]
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_default_snapshot_path_ends_with_file_name() {
        let config = SearchConfig::default();
        let path = config.resolved_snapshot_path();
        assert!(path.ends_with("aide/search-index.json"));
    }

    #[test]
    fn test_default_skip_threshold_bytes() {
        assert_eq!(
            SearchConfig::default().snapshot_skip_bytes(),
            20 * 1024 * 1024
        );
    }

    #[test]
    fn test_megabytes_to_bytes_fractional() {
        assert_eq!(megabytes_to_bytes(0.5), 512 * 1024);
        assert_eq!(megabytes_to_bytes(10.0), 10 * 1024 * 1024);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = AppConfig::default();
        config.search.roots = Some(vec!["/srv/docs".to_string()]);
        config.tools.disabled = vec!["file_search".to_string()];

        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed = AppConfig::parse(&rendered).unwrap();
        assert_eq!(parsed.search.roots, config.search.roots);
        assert_eq!(parsed.tools.disabled, config.tools.disabled);
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[test_log::test(tokio::test)]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("aide.toml");
        tokio::fs::write(
            &path,
            b"[daemon]\nlisten_port = 4242\n\n[search]\nsize_limit_mb = 0.2\n",
        )
        .await
        .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.daemon.listen_port, 4242);
        assert_eq!(config.search.size_limit_mb, 0.2);
    }

    #[test_log::test(tokio::test)]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/aide.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test_log::test(tokio::test)]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = AppConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
