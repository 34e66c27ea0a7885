use std::fs;
use std::path::{Path, PathBuf};

use crate::StorageError;

/// Layout of the application-data directory.
///
/// Everything the browser keeps on disk lives under one root. The engine
/// owns the contents of `Cache/` and `Profiles/`; the shell only creates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> PathBuf {
        self.root.join("Cache")
    }

    pub fn logs(&self) -> PathBuf {
        self.root.join("Logs")
    }

    pub fn profiles(&self) -> PathBuf {
        self.root.join("Profiles")
    }

    pub fn profile(&self, name: &str) -> PathBuf {
        self.profiles().join(name)
    }

    pub fn extensions(&self) -> PathBuf {
        self.root.join("Extensions")
    }

    pub fn themes(&self) -> PathBuf {
        self.root.join("Themes")
    }

    /// Static assets served next to the bundled pages.
    pub fn assets(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn bookmarks_file(&self) -> PathBuf {
        self.root.join("bookmarks.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.root.join("history.log")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs().join("browser.log")
    }

    /// Creates the root and every well-known subdirectory.
    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        for dir in [
            self.root.clone(),
            self.cache(),
            self.logs(),
            self.profiles(),
            self.extensions(),
            self.themes(),
            self.assets(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        }
        Ok(())
    }
}
