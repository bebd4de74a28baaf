//! Clone configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for one clone.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CloneConfig {
    /// Service path appended to the remote URL.
    pub upload_pack_path: String,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// Per-request timeout in seconds; `None` blocks until the remote answers.
    pub timeout_secs: Option<u64>,
    /// Write `HEAD` and the branch ref after storing objects.
    pub write_head: bool,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            upload_pack_path: "git-upload-pack".to_string(),
            user_agent: concat!("packrat/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: None,
            write_head: true,
        }
    }
}

impl CloneConfig {
    /// Request timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Full upload-pack endpoint for a remote.
    pub fn endpoint(&self, url: &str) -> String {
        format!(
            "{}/{}",
            url.trim_end_matches('/'),
            self.upload_pack_path.trim_start_matches('/')
        )
    }
}
