use std::path::Path;
use std::sync::OnceLock;

use dashmap::DashSet;

static USED_IDS: OnceLock<DashSet<String>> = OnceLock::new();

fn used_ids() -> &'static DashSet<String> {
    USED_IDS.get_or_init(DashSet::new)
}

/// A short hex identifier unique for the lifetime of the process, used to
/// name per-pipeline workspace directories. The id is returned to the pool
/// when the handle is dropped.
#[derive(Debug)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Reserves a fresh id. Retries on collision, which is rare for the
    /// 32-bit space against a handful of live pipelines.
    pub fn reserve() -> Self {
        loop {
            let raw: [u8; 4] = rand::random();
            let id = hex::encode(raw);
            if used_ids().insert(id.clone()) {
                return Self(id);
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Drop for WorkspaceId {
    fn drop(&mut self) {
        used_ids().remove(&self.0);
    }
}

/// Removes workspace directories left behind by an unclean shutdown.
/// Called once at startup before any pipeline runs. Returns how many
/// directories were removed.
pub fn clean_workspaces(root: &Path) -> std::io::Result<usize> {
    if !root.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ids_are_unique_and_released_on_drop() {
        let a = WorkspaceId::reserve();
        let b = WorkspaceId::reserve();
        assert_ne!(a.as_str(), b.as_str());
        assert_eq!(a.as_str().len(), 8);

        let id = a.as_str().to_string();
        assert!(used_ids().contains(&id));
        drop(a);
        assert!(!used_ids().contains(&id));
    }

    #[test]
    fn clean_workspaces_removes_only_directories() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("a1b2c3d4")).unwrap();
        std::fs::create_dir(root.path().join("deadbeef")).unwrap();
        std::fs::write(root.path().join("keep.log"), b"x").unwrap();

        let removed = clean_workspaces(root.path()).unwrap();
        assert_eq!(removed, 2);
        assert!(root.path().join("keep.log").exists());

        // A missing root is not an error.
        assert_eq!(clean_workspaces(Path::new("/nonexistent/soapbox")).unwrap(), 0);
    }
}
