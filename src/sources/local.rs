//! Tracks from a local library directory.
//!
//! A query is tried as a path relative to the library root first. A file
//! resolves to a single track and a directory to a playlist; anything else
//! falls back to a case-insensitive filename search over the whole tree.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::sources::{
    AudioSource, MediaError, Resolution, ResolveError, TrackInfo, TrackPayload,
};

const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "ogg", "flac", "wav"];

pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn track_info(&self, path: &Path) -> TrackInfo {
        let id = path
            .strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.clone());
        TrackInfo {
            id,
            title,
            source: self.name().to_string(),
        }
    }

    fn playlist(&self, dir: &Path) -> std::io::Result<Resolution> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_audio_file(path))
            .collect();
        paths.sort();

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "library".to_string());
        let tracks = paths.iter().map(|p| self.track_info(p)).collect();
        Ok(Resolution::Playlist { name, tracks })
    }

    /// Walks the library for the first audio file whose name contains
    /// `query`, ignoring case. Directories are visited in sorted order so
    /// repeated searches give the same answer.
    fn search(&self, query: &str) -> Option<PathBuf> {
        let needle = query.to_lowercase();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            let mut paths: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .collect();
            paths.sort();

            let mut subdirs = Vec::new();
            for path in paths {
                if path.is_dir() {
                    subdirs.push(path);
                } else if is_audio_file(&path)
                    && path
                        .file_name()
                        .is_some_and(|n| n.to_string_lossy().to_lowercase().contains(&needle))
                {
                    return Some(path);
                }
            }
            // Depth-first, keeping sibling order.
            subdirs.reverse();
            pending.extend(subdirs);
        }
        None
    }
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

fn escapes_root(query: &str) -> bool {
    query.split(['/', '\\']).any(|part| part == "..")
}

#[async_trait]
impl AudioSource for LocalSource {
    fn name(&self) -> &str {
        "local"
    }

    fn can_handle(&self, query: &str) -> bool {
        !query.contains("://")
    }

    async fn resolve(&self, query: &str) -> Result<Resolution, ResolveError> {
        if query.is_empty() || escapes_root(query) {
            return Err(ResolveError::NotFound(query.to_string()));
        }

        let candidate = self.root.join(query);
        if candidate.is_file() && is_audio_file(&candidate) {
            return Ok(Resolution::Track(self.track_info(&candidate)));
        }
        if candidate.is_dir() {
            return self.playlist(&candidate).map_err(|err| ResolveError::Source {
                source: self.name().to_string(),
                message: err.to_string(),
            });
        }

        match self.search(query) {
            Some(path) => {
                debug!("Library search {:?} matched {}", query, path.display());
                Ok(Resolution::Track(self.track_info(&path)))
            }
            None => Err(ResolveError::NotFound(query.to_string())),
        }
    }

    async fn fetch(
        &self,
        info: &TrackInfo,
        _workspace: &Path,
    ) -> Result<TrackPayload, MediaError> {
        let path = self.root.join(&info.id);
        std::fs::metadata(&path)?;
        Ok(TrackPayload { path, owned: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> (tempfile::TempDir, LocalSource) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("ambient")).unwrap();
        for name in ["ambient/dawn.mp3", "ambient/dusk.ogg", "Morning Dew.flac"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::write(dir.path().join("ambient/notes.txt"), b"x").unwrap();
        let source = LocalSource::new(dir.path().to_path_buf());
        (dir, source)
    }

    #[test]
    fn urls_are_left_to_other_sources() {
        let source = LocalSource::new(PathBuf::from("/tmp"));
        assert!(source.can_handle("ambient/dawn.mp3"));
        assert!(!source.can_handle("https://example.com/a.mp3"));
    }

    #[tokio::test]
    async fn path_queries_resolve_files_and_directories() {
        let (_dir, source) = library();

        match source.resolve("ambient/dawn.mp3").await.unwrap() {
            Resolution::Track(info) => {
                assert_eq!(info.title, "dawn");
                assert_eq!(info.source, "local");
            }
            other => panic!("unexpected resolution: {:?}", other),
        }

        match source.resolve("ambient").await.unwrap() {
            Resolution::Playlist { name, tracks } => {
                assert_eq!(name, "ambient");
                let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
                // Sorted, and the text file is skipped.
                assert_eq!(titles, ["dawn", "dusk"]);
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[tokio::test]
    async fn search_ignores_case_and_recurses() {
        let (_dir, source) = library();

        match source.resolve("DUSK").await.unwrap() {
            Resolution::Track(info) => assert_eq!(info.title, "dusk"),
            other => panic!("unexpected resolution: {:?}", other),
        }
        match source.resolve("morning").await.unwrap() {
            Resolution::Track(info) => assert_eq!(info.title, "Morning Dew"),
            other => panic!("unexpected resolution: {:?}", other),
        }
        assert!(matches!(
            source.resolve("nothing-here").await,
            Err(ResolveError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn queries_cannot_escape_the_library() {
        let (_dir, source) = library();
        assert!(matches!(
            source.resolve("../outside.mp3").await,
            Err(ResolveError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn fetch_borrows_the_library_file() {
        let (_dir, source) = library();
        let Resolution::Track(info) = source.resolve("dawn").await.unwrap() else {
            panic!("expected a track");
        };
        let workspace = tempfile::tempdir().unwrap();
        let payload = source.fetch(&info, workspace.path()).await.unwrap();
        assert!(!payload.owned);
        assert!(payload.path.ends_with("ambient/dawn.mp3"));
    }
}
