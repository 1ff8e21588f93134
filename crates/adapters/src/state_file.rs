//! File-backed bookmark store

use async_trait::async_trait;
use skybridge_domain::{BookmarkError, BookmarkStore, WatermarkMap};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Bookmark store persisting the watermark map as a flat JSON object.
///
/// Saves go through a sibling temp file and a rename, so a crash mid-write
/// loses at most the latest update.
pub struct FileBookmarkStore {
    path: PathBuf,
}

impl FileBookmarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("bookmarks.json"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl BookmarkStore for FileBookmarkStore {
    async fn load(&self) -> WatermarkMap {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    path = %self.path.display(),
                    "No bookmark file yet, starting with empty watermarks"
                );
                return WatermarkMap::new();
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Unreadable bookmark file, starting with empty watermarks"
                );
                return WatermarkMap::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Corrupt bookmark file, starting with empty watermarks"
                );
                WatermarkMap::new()
            }
        }
    }

    async fn save(&self, watermarks: &WatermarkMap) -> Result<(), BookmarkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(watermarks)
            .map_err(|e| BookmarkError::Serialize(e.to_string()))?;

        let tmp = self.tmp_path();
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;

        tracing::debug!(
            path = %self.path.display(),
            entries = watermarks.len(),
            "Saved watermarks"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileBookmarkStore::new(dir.path().join("bookmarks.json"));

        let mut map = WatermarkMap::new();
        map.advance("alice", "100");
        map.advance("bob", "42");

        store.save(&map).await.unwrap();
        let loaded = store.load().await;

        assert_eq!(loaded, map);
    }

    #[tokio::test]
    async fn load_missing_file_returns_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileBookmarkStore::new(dir.path().join("nope.json"));

        let loaded = store.load().await;

        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn load_corrupt_file_returns_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookmarks.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileBookmarkStore::new(path);
        let loaded = store.load().await;

        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = FileBookmarkStore::new(dir.path().join("state/deep/bookmarks.json"));

        let mut map = WatermarkMap::new();
        map.advance("alice", "1");

        store.save(&map).await.unwrap();

        assert_eq!(store.load().await, map);
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let store = FileBookmarkStore::new(dir.path().join("bookmarks.json"));

        let mut map = WatermarkMap::new();
        map.advance("alice", "1");
        store.save(&map).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![OsString::from("bookmarks.json")]);
    }

    #[tokio::test]
    async fn save_overwrites_previous_state() {
        let dir = TempDir::new().unwrap();
        let store = FileBookmarkStore::new(dir.path().join("bookmarks.json"));

        let mut map = WatermarkMap::new();
        map.advance("alice", "1");
        store.save(&map).await.unwrap();

        map.advance("alice", "2");
        store.save(&map).await.unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.get("alice"), Some("2"));
    }
}
