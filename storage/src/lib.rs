use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

mod bookmarks;
mod history;
mod paths;
mod settings;

pub use bookmarks::{Bookmark, BookmarkStore, JsonBookmarkStore};
pub use history::{FileHistoryLog, HistoryEntry, HistoryLog};
pub use paths::AppPaths;
pub use settings::{JsonSettingsStore, Settings, SettingsStore};

/// Failure reading or writing one of the app-data files.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Replaces `path` with `contents` through a sibling temp file and a rename,
/// so readers never observe a half-written file.
fn replace_file(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).map_err(|e| StorageError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))
}
