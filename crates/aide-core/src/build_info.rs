//! Build metadata embedded by `build.rs`.

use serde::{Deserialize, Serialize};

/// Short git commit hash, or `unknown` outside a checkout.
pub const GIT_HASH: &str = env!("AIDE_GIT_HASH");

/// Seconds since the Unix epoch at build time.
pub const BUILD_TIMESTAMP: &str = env!("AIDE_BUILD_TIMESTAMP");

/// Cargo profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("AIDE_BUILD_PROFILE");

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// E.g. `"0.1.0 (abc1234, debug)"`.
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

/// The same metadata as a serializable value, reported by `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: u64,
    pub profile: String,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION.to_string(),
            git_hash: GIT_HASH.to_string(),
            build_timestamp: BUILD_TIMESTAMP.parse().unwrap_or(0),
            profile: BUILD_PROFILE.to_string(),
        }
    }
}
