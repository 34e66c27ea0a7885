use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::error;
use serde::{Deserialize, Serialize};

use crate::{replace_file, StorageError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub title: String,
    pub url: String,
}

/// Interface for bookmark persistence.
pub trait BookmarkStore {
    /// Returns all bookmarks; unreadable files load as empty.
    fn load(&self) -> Vec<Bookmark>;

    /// Adds a bookmark. Returns `false` if the URL was already bookmarked.
    fn add(&self, bookmark: Bookmark) -> Result<bool, StorageError>;
}

/// Bookmarks stored as a JSON array in `bookmarks.json`.
#[derive(Debug, Clone)]
pub struct JsonBookmarkStore {
    path: PathBuf,
}

impl JsonBookmarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_load(&self) -> Result<Vec<Bookmark>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        serde_json::from_str(&raw).map_err(|e| StorageError::json(&self.path, e))
    }
}

impl BookmarkStore for JsonBookmarkStore {
    fn load(&self) -> Vec<Bookmark> {
        self.try_load().unwrap_or_else(|e| {
            error!("Error loading bookmarks: {e}");
            Vec::new()
        })
    }

    fn add(&self, bookmark: Bookmark) -> Result<bool, StorageError> {
        let mut bookmarks = self.load();
        if bookmarks.iter().any(|b| b.url == bookmark.url) {
            return Ok(false);
        }
        bookmarks.push(bookmark);
        let json =
            serde_json::to_vec_pretty(&bookmarks).map_err(|e| StorageError::json(&self.path, e))?;
        replace_file(&self.path, &json)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bookmark(url: &str) -> Bookmark {
        Bookmark {
            title: "Example".into(),
            url: url.into(),
        }
    }

    #[test]
    fn add_persists_and_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonBookmarkStore::new(dir.path().join("bookmarks.json"));
        assert!(store.load().is_empty());

        assert!(store.add(bookmark("https://a.example")).unwrap());
        assert!(store.add(bookmark("https://b.example")).unwrap());
        assert!(!store.add(bookmark("https://a.example")).unwrap());

        let urls: Vec<String> = store.load().into_iter().map(|b| b.url).collect();
        assert_eq!(urls, ["https://a.example", "https://b.example"]);
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookmarks.json");
        fs::write(&path, "[{").unwrap();
        assert!(JsonBookmarkStore::new(&path).load().is_empty());
    }
}
