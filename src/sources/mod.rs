//! Audio sources: where tracks come from.
//!
//! A source resolves free-form queries into track metadata and later
//! fetches the actual media. Sources are consulted in registration order;
//! the first one that claims a query handles it.

pub mod decode;
pub mod http;
pub mod local;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::configs::Config;

pub use http::HttpSource;
pub use local::LocalSource;

/// Metadata describing one playable track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Source-specific identifier, enough for the source to fetch it.
    pub id: String,
    pub title: String,
    /// Name of the source that resolved this track.
    pub source: String,
}

/// What a query resolved to.
#[derive(Debug, Clone)]
pub enum Resolution {
    Track(TrackInfo),
    Playlist { name: String, tracks: Vec<TrackInfo> },
}

#[derive(Debug)]
pub enum ResolveError {
    Unsupported(String),
    NotFound(String),
    Source { source: String, message: String },
}

// Manual impls instead of `derive(Error)`: thiserror insists a field
// named `source` is the error cause, but here it is the audio source name.
impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::Unsupported(query) => write!(f, "no source accepts query: {query}"),
            ResolveError::NotFound(query) => write!(f, "nothing found for: {query}"),
            ResolveError::Source { source, message } => {
                write!(f, "source {source} failed: {message}")
            }
        }
    }
}

impl std::error::Error for ResolveError {}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("media request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("download failed: {0}")]
    Download(String),
    #[error("unsupported media: {0}")]
    Unsupported(String),
}

/// Fetched media, ready to decode. Downloaded files are owned by the
/// payload and removed on [`TrackPayload::discard`].
#[derive(Debug)]
pub struct TrackPayload {
    pub path: PathBuf,
    /// Whether the file was created for this track and should be deleted
    /// after playback. Library files are borrowed, not owned.
    pub owned: bool,
}

impl TrackPayload {
    /// Starts decoding the payload into channel-rate mono PCM frames.
    pub fn open_stream(&self) -> Result<flume::Receiver<Vec<i16>>, MediaError> {
        decode::stream_file(&self.path)
    }

    pub fn discard(&self) {
        if self.owned {
            if let Err(err) = std::fs::remove_file(&self.path) {
                tracing::debug!("Could not remove {}: {}", self.path.display(), err);
            }
        }
    }
}

#[async_trait]
pub trait AudioSource: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this source wants to handle the query at all.
    fn can_handle(&self, query: &str) -> bool;

    async fn resolve(&self, query: &str) -> Result<Resolution, ResolveError>;

    /// Materializes the track under `workspace` (or points at an existing
    /// file outside it).
    async fn fetch(
        &self,
        info: &TrackInfo,
        workspace: &std::path::Path,
    ) -> Result<TrackPayload, MediaError>;
}

/// The ordered set of enabled sources.
pub struct SourceSet {
    sources: Vec<Box<dyn AudioSource>>,
}

impl SourceSet {
    pub fn new(config: &Config) -> Self {
        let mut sources: Vec<Box<dyn AudioSource>> = Vec::new();
        if config.sources.local {
            sources.push(Box::new(LocalSource::new(config.sources.library_root())));
        }
        if config.sources.http {
            sources.push(Box::new(HttpSource::new(config.sources.http_chunk_bytes)));
        }
        for source in &sources {
            info!("Loaded source: {}", source.name());
        }
        Self { sources }
    }

    pub fn with_sources(sources: Vec<Box<dyn AudioSource>>) -> Self {
        Self { sources }
    }

    /// Resolves `query` with the first source that claims it.
    pub async fn resolve(&self, query: &str) -> Result<Resolution, ResolveError> {
        for source in &self.sources {
            if source.can_handle(query) {
                return source.resolve(query).await;
            }
        }
        Err(ResolveError::Unsupported(query.to_string()))
    }

    /// Fetches a resolved track via the source that produced it.
    pub async fn fetch(
        &self,
        info: &TrackInfo,
        workspace: &std::path::Path,
    ) -> Result<TrackPayload, MediaError> {
        let source = self
            .sources
            .iter()
            .find(|s| s.name() == info.source)
            .ok_or_else(|| MediaError::Unsupported(format!("unknown source: {}", info.source)))?;
        source.fetch(info, workspace).await
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}
