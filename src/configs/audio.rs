use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AudioConfig {
    /// Root directory for per-pipeline download workspaces. Swept clean of
    /// leftover workspace directories at startup.
    #[serde(default = "default_path")]
    pub path: String,
}

impl AudioConfig {
    pub fn workspace_root(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
        }
    }
}

fn default_path() -> String {
    "audio".to_string()
}
