#![deny(unsafe_code)]

//! Shared test utilities for the aide workspace.
//!
//! Filesystem fixtures, config builders, a running-daemon harness, and
//! tracing helpers, so individual crate tests stay short.
//!
//! ```toml
//! [dev-dependencies]
//! aide-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod tracing_setup;
pub mod tree;

pub use config::TestConfigBuilder;
pub use daemon::TestDaemon;
pub use tree::TestTree;
