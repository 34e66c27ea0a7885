use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::StorageError;

/// One visited URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: OffsetDateTime,
    pub url: String,
}

impl HistoryEntry {
    /// Entry stamped with the current local time (UTC if the local offset
    /// cannot be determined).
    pub fn now(url: &str) -> Self {
        Self {
            timestamp: OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
            url: url.to_string(),
        }
    }

    /// Formats the entry as a `history.log` line, without the newline.
    pub fn to_line(&self) -> Result<String, StorageError> {
        Ok(format!("{} - {}", self.timestamp.format(&Rfc3339)?, self.url))
    }

    /// Parses a `<timestamp> - <url>` line.
    pub fn parse_line(line: &str) -> Option<Self> {
        let (stamp, url) = line.split_once(" - ")?;
        let timestamp = OffsetDateTime::parse(stamp.trim(), &Rfc3339).ok()?;
        let url = url.trim_end();
        if url.is_empty() {
            return None;
        }
        Some(Self {
            timestamp,
            url: url.to_string(),
        })
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp.format(&Rfc3339) {
            Ok(stamp) => write!(f, "{stamp} - {}", self.url),
            Err(_) => write!(f, "{} - {}", self.timestamp, self.url),
        }
    }
}

/// Append-only record of visited URLs.
pub trait HistoryLog {
    /// Records a visit. Failures are logged, never surfaced.
    fn record_visit(&self, url: &str);
}

/// History kept as `<ISO-8601 timestamp> - <url>` lines in a text file.
#[derive(Debug, Clone)]
pub struct FileHistoryLog {
    path: PathBuf,
}

impl FileHistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry, reporting failures to the caller.
    pub fn append(&self, entry: &HistoryEntry) -> Result<(), StorageError> {
        let mut line = entry.to_line()?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| StorageError::io(&self.path, e))
    }

    /// Reads every well-formed entry in file order. A missing file is empty.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        Ok(raw.lines().filter_map(HistoryEntry::parse_line).collect())
    }
}

impl HistoryLog for FileHistoryLog {
    fn record_visit(&self, url: &str) {
        if let Err(e) = self.append(&HistoryEntry::now(url)) {
            error!("History logging failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn visits_are_appended_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileHistoryLog::new(dir.path().join("history.log"));
        log.record_visit("https://one.example");
        log.record_visit("https://two.example");

        let urls: Vec<String> = log.entries().unwrap().into_iter().map(|e| e.url).collect();
        assert_eq!(urls, ["https://one.example", "https://two.example"]);
    }

    #[test]
    fn line_format() {
        let entry = HistoryEntry {
            timestamp: datetime!(2025-03-01 12:30:05 UTC),
            url: "https://example.com".into(),
        };
        assert_eq!(
            entry.to_line().unwrap(),
            "2025-03-01T12:30:05Z - https://example.com"
        );
        assert_eq!(HistoryEntry::parse_line(&entry.to_line().unwrap()), Some(entry));
    }

    #[test]
    fn url_containing_separator_survives() {
        let line = "2025-03-01T12:30:05+02:00 - http://localhost:8000/search.html?q=a+-+b - c";
        let entry = HistoryEntry::parse_line(line).unwrap();
        assert_eq!(entry.url, "http://localhost:8000/search.html?q=a+-+b - c");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");
        fs::write(
            &path,
            "garbage\n2025-03-01T12:30:05Z - https://ok.example\nnot-a-date - https://x\n",
        )
        .unwrap();
        let entries = FileHistoryLog::new(&path).entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://ok.example");
    }

    #[test]
    fn write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileHistoryLog::new(dir.path().join("missing").join("history.log"));
        log.record_visit("https://example.com");
        assert!(log.append(&HistoryEntry::now("https://example.com")).is_err());
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileHistoryLog::new(dir.path().join("history.log"));
        assert!(log.entries().unwrap().is_empty());
    }
}
