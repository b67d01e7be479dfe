//! Snapshot and history persistence.
//!
//! The snapshot holds the full text of the last accepted report and is
//! replaced atomically on every accepted cycle. The history log only ever
//! grows: each accepted report is appended as
//!
//! ```text
//! === 2026-10-18T07:00:00Z ===
//! <report text>
//!
//! ---
//!
//! ```
//!
//! A body line that looks like an entry header (`=== ... ===`, possibly
//! behind backslashes) gets one extra leading `\` on append and loses it on
//! read, so report text can never open a new entry.
//!
//! An absent or blank snapshot is the first-run signal; there is no separate
//! flag file.

use chrono::{DateTime, SecondsFormat, Utc};
use fs2::FileExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StoreError;

pub const SNAPSHOT_FILE: &str = "snapshot.txt";
pub const HISTORY_FILE: &str = "history.txt";
pub const LOCK_FILE: &str = ".digest.lock";

/// Written after every history entry.
const ENTRY_DELIMITER: &str = "\n\n---\n\n";

static ENTRY_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^=== (\S+) ===\r?$").expect("ENTRY_HEADER regex should compile")
});

/// Header-shaped body line, with any backslashes already in front of it.
static HEADER_LIKE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(\\*=== \S+ ===\r?)$").expect("HEADER_LIKE_LINE regex should compile")
});

static ESCAPED_HEADER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\\(\\*=== \S+ ===\r?)$")
        .expect("ESCAPED_HEADER_LINE regex should compile")
});

/// One accepted report as recorded in the history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub recorded_at: DateTime<Utc>,
    pub text: String,
}

/// File-backed snapshot + history store.
#[derive(Debug, Clone)]
pub struct ReportStore {
    snapshot_path: PathBuf,
    history_path: PathBuf,
    lock_path: PathBuf,
}

impl ReportStore {
    /// Store using the default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            snapshot_path: dir.join(SNAPSHOT_FILE),
            history_path: dir.join(HISTORY_FILE),
            lock_path: dir.join(LOCK_FILE),
        }
    }

    pub fn new(
        snapshot_path: impl Into<PathBuf>,
        history_path: impl Into<PathBuf>,
        lock_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            history_path: history_path.into(),
            lock_path: lock_path.into(),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    /// Last accepted report, or an empty string before the first run.
    pub fn load(&self) -> Result<String, StoreError> {
        match fs::read_to_string(&self.snapshot_path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(StoreError::io(&self.snapshot_path, e)),
        }
    }

    pub fn is_first_run(&self) -> Result<bool, StoreError> {
        Ok(self.load()?.trim().is_empty())
    }

    /// Replace the snapshot: temp file in the same directory, fsync, rename.
    pub fn save(&self, text: &str) -> Result<(), StoreError> {
        let dir = ensure_parent(&self.snapshot_path)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        tmp.write_all(text.as_bytes())
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&self.snapshot_path)
            .map_err(|e| StoreError::io(&self.snapshot_path, e.error))?;

        debug!(path = %self.snapshot_path.display(), bytes = text.len(), "Snapshot saved");
        Ok(())
    }

    /// Append `text` to the history log stamped with the current time.
    pub fn append(&self, text: &str) -> Result<(), StoreError> {
        self.append_at(text, Utc::now())
    }

    /// Append `text` to the history log with an explicit timestamp.
    pub fn append_at(&self, text: &str, recorded_at: DateTime<Utc>) -> Result<(), StoreError> {
        ensure_parent(&self.history_path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .map_err(|e| StoreError::io(&self.history_path, e))?;

        let entry = format!(
            "=== {} ===\n{}{}",
            recorded_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            HEADER_LIKE_LINE.replace_all(text, r"\${1}"),
            ENTRY_DELIMITER
        );
        file.write_all(entry.as_bytes())
            .map_err(|e| StoreError::io(&self.history_path, e))?;

        debug!(path = %self.history_path.display(), bytes = text.len(), "History entry appended");
        Ok(())
    }

    /// All history entries, oldest first.
    pub fn history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let content = match fs::read_to_string(&self.history_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.history_path, e)),
        };
        parse_history(&content).map_err(|message| StoreError::CorruptHistory {
            path: self.history_path.clone(),
            message,
        })
    }

    /// Block until this process holds the store lock.
    pub fn lock(&self) -> Result<StoreLock, StoreError> {
        let file = self.open_lock_file()?;
        FileExt::lock_exclusive(&file).map_err(|e| StoreError::io(&self.lock_path, e))?;
        Ok(StoreLock {
            file,
            path: self.lock_path.clone(),
        })
    }

    /// Take the store lock if nobody else holds it.
    pub fn try_lock(&self) -> Result<Option<StoreLock>, StoreError> {
        let file = self.open_lock_file()?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(StoreLock {
                file,
                path: self.lock_path.clone(),
            })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(StoreError::io(&self.lock_path, e)),
        }
    }

    fn open_lock_file(&self) -> Result<File, StoreError> {
        ensure_parent(&self.lock_path)?;
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| StoreError::io(&self.lock_path, e))
    }
}

/// Exclusive lock on the store, released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release store lock");
        }
    }
}

fn ensure_parent(path: &Path) -> Result<PathBuf, StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
    Ok(dir)
}

fn parse_history(content: &str) -> Result<Vec<HistoryEntry>, String> {
    // A header only counts at the start of the file or right after a delimiter
    let headers: Vec<(usize, usize, DateTime<Utc>)> = ENTRY_HEADER
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let at_boundary =
                whole.start() == 0 || content[..whole.start()].ends_with(ENTRY_DELIMITER);
            if !at_boundary {
                return None;
            }
            let recorded_at = DateTime::parse_from_rfc3339(caps.get(1)?.as_str()).ok()?;
            Some((whole.start(), whole.end(), recorded_at.with_timezone(&Utc)))
        })
        .collect();

    let first_start = headers.first().map_or(content.len(), |h| h.0);
    if !content[..first_start].trim().is_empty() {
        return Err("content before the first entry header".to_string());
    }

    let entries = headers
        .iter()
        .enumerate()
        .map(|(i, &(_, header_end, recorded_at))| {
            let body_start = (header_end + 1).min(content.len());
            let body_end = headers.get(i + 1).map_or(content.len(), |next| next.0);
            let body = &content[body_start..body_end];
            let text = body.strip_suffix(ENTRY_DELIMITER).unwrap_or(body);
            HistoryEntry {
                recorded_at,
                text: ESCAPED_HEADER_LINE.replace_all(text, "${1}").into_owned(),
            }
        })
        .collect();
    Ok(entries)
}
