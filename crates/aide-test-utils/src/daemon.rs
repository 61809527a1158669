//! A running daemon for integration tests.
//!
//! [`TestDaemon`] starts a [`Daemon`] whose socket, search roots, and index
//! snapshot all live in a private temp tree, so tests never touch the real
//! user directories.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aide_config::AppConfig;
use aide_core::Daemon;
use aide_core::daemon::DaemonError;
use aide_core::ipc::IpcClient;
use tokio::task::JoinHandle;

use crate::config::TestConfigBuilder;
use crate::tree::TestTree;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A daemon serving IPC from a temp directory.
///
/// The tree is laid out as:
///
/// ```text
/// <tmp>/aide.toml          config the daemon was loaded from
/// <tmp>/aide.sock          IPC socket
/// <tmp>/home/              the only search root
/// <tmp>/data/index.json    index snapshot
/// ```
pub struct TestDaemon {
    pub daemon: Arc<Daemon>,
    pub tree: TestTree,
    pub config_path: PathBuf,
    handle: JoinHandle<Result<(), DaemonError>>,
}

impl TestDaemon {
    /// Start with the default layout.
    pub async fn start() -> Self {
        Self::start_with(|builder| builder).await
    }

    /// Start after seeding the search root with `files` (relative path, contents).
    pub async fn start_with_files(files: &[(&str, &str)]) -> Self {
        let tree = TestTree::new();
        for (path, contents) in files {
            tree.file(&format!("home/{path}"), contents);
        }
        Self::launch(tree, |builder| builder).await
    }

    /// Start with extra configuration applied on top of the default layout.
    pub async fn start_with(customize: impl FnOnce(TestConfigBuilder) -> TestConfigBuilder) -> Self {
        Self::launch(TestTree::new(), customize).await
    }

    async fn launch(
        tree: TestTree,
        customize: impl FnOnce(TestConfigBuilder) -> TestConfigBuilder,
    ) -> Self {
        tree.dir("home");
        let config = customize(
            TestConfigBuilder::new()
                .socket_path(tree.path().join("aide.sock"))
                .search_roots(vec![tree.path().join("home")])
                .snapshot_path(tree.path().join("data").join("index.json")),
        )
        .build();

        // Round-trip through a file so the daemon sees what a user's
        // config file would produce.
        let config_path = tree.path().join("aide.toml");
        let toml = toml::to_string_pretty(&config).expect("failed to serialize test config");
        tokio::fs::write(&config_path, toml)
            .await
            .expect("failed to write test config");
        let config = AppConfig::load(&config_path)
            .await
            .expect("failed to load test config");

        let daemon = Arc::new(Daemon::new(config));
        let runner = Arc::clone(&daemon);
        let handle = tokio::spawn(async move { runner.run().await });

        let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;
        while !daemon.socket_path().exists() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "daemon did not bind {}",
                daemon.socket_path().display()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Self {
            daemon,
            tree,
            config_path,
            handle,
        }
    }

    pub fn client(&self) -> IpcClient {
        IpcClient::new(self.daemon.socket_path())
    }

    /// The search root.
    pub fn home(&self) -> PathBuf {
        self.tree.path().join("home")
    }

    /// Shut down and wait for `run` to return.
    pub async fn stop(self) -> Result<(), DaemonError> {
        self.daemon.shutdown();
        tokio::time::timeout(STOP_TIMEOUT, self.handle)
            .await
            .expect("daemon did not stop in time")
            .expect("daemon task panicked")
    }
}
