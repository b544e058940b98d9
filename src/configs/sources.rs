use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourcesConfig {
    #[serde(default = "default_true")]
    pub http: bool,
    #[serde(default = "default_true")]
    pub local: bool,
    /// Directory the local source searches for audio files.
    #[serde(default = "default_library_path")]
    pub library_path: String,
    /// Chunk size for ranged HTTP downloads, in bytes.
    #[serde(default = "default_http_chunk_bytes")]
    pub http_chunk_bytes: u64,
}

impl SourcesConfig {
    pub fn library_root(&self) -> PathBuf {
        PathBuf::from(&self.library_path)
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            http: true,
            local: true,
            library_path: default_library_path(),
            http_chunk_bytes: default_http_chunk_bytes(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_library_path() -> String {
    "library".to_string()
}

fn default_http_chunk_bytes() -> u64 {
    // 10 MiB
    10 * 1024 * 1024
}
