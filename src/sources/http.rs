//! Tracks fetched from plain HTTP(S) URLs.
//!
//! Files are pulled with ranged requests in fixed-size chunks so a dropped
//! connection fails fast instead of stalling one huge GET. Servers that
//! ignore `Range` just deliver everything in one response.

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::sources::{
    AudioSource, MediaError, Resolution, ResolveError, TrackInfo, TrackPayload,
};

pub struct HttpSource {
    client: reqwest::Client,
    url_pattern: Regex,
    chunk_bytes: u64,
}

impl HttpSource {
    pub fn new(chunk_bytes: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            // Matches http:// or https:// URLs
            url_pattern: Regex::new(r"(?i)^https?://").unwrap(),
            chunk_bytes: chunk_bytes.max(1),
        }
    }
}

/// Last path segment of the URL, percent-decoded, without query or
/// fragment. Bare hosts keep the whole URL as their title.
fn title_from_url(url: &str) -> String {
    let trimmed = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/');
    let path = trimmed
        .find("://")
        .map(|i| &trimmed[i + 3..])
        .unwrap_or(trimmed);
    match path.rsplit_once('/') {
        Some((_, segment)) if !segment.is_empty() => urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string()),
        _ => url.to_string(),
    }
}

/// File extension hinted by the URL path, if it looks like one.
fn extension_from_url(url: &str) -> Option<&str> {
    let trimmed = url.split(['?', '#']).next()?.trim_end_matches('/');
    let path = trimmed
        .find("://")
        .map(|i| &trimmed[i + 3..])
        .unwrap_or(trimmed);
    let (_, segment) = path.rsplit_once('/')?;
    let (_, ext) = segment.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}

#[async_trait]
impl AudioSource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, query: &str) -> bool {
        self.url_pattern.is_match(query)
    }

    async fn resolve(&self, query: &str) -> Result<Resolution, ResolveError> {
        Ok(Resolution::Track(TrackInfo {
            id: query.to_string(),
            title: title_from_url(query),
            source: self.name().to_string(),
        }))
    }

    async fn fetch(
        &self,
        info: &TrackInfo,
        workspace: &Path,
    ) -> Result<TrackPayload, MediaError> {
        let name: [u8; 4] = rand::random();
        let file_name = match extension_from_url(&info.id) {
            Some(ext) => format!("{}.{}", hex::encode(name), ext),
            None => hex::encode(name),
        };
        let path = workspace.join(file_name);
        let mut file = tokio::fs::File::create(&path).await?;

        let mut start: u64 = 0;
        let chunk = self.chunk_bytes;
        loop {
            let mut resp = self
                .client
                .get(&info.id)
                .header(RANGE, format!("bytes={}-{}", start, start + chunk - 1))
                .send()
                .await?;

            match resp.status() {
                StatusCode::PARTIAL_CONTENT => {
                    let mut received: u64 = 0;
                    while let Some(bytes) = resp.chunk().await? {
                        received += bytes.len() as u64;
                        file.write_all(&bytes).await?;
                    }
                    start += received;
                    // A short range means the server ran out of file.
                    if received < chunk {
                        break;
                    }
                }
                StatusCode::OK => {
                    // Range ignored; the whole file arrives at once.
                    while let Some(bytes) = resp.chunk().await? {
                        start += bytes.len() as u64;
                        file.write_all(&bytes).await?;
                    }
                    break;
                }
                StatusCode::RANGE_NOT_SATISFIABLE if start > 0 => break,
                status => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(MediaError::Download(format!(
                        "{} returned {}",
                        info.id, status
                    )));
                }
            }
        }
        file.flush().await?;
        debug!(
            "Downloaded {} ({} bytes) to {}",
            info.id,
            start,
            path.display()
        );

        Ok(TrackPayload { path, owned: true })
    }
}
