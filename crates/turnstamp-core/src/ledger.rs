//! Per-transcript timestamp ledger.
//!
//! One record per line, `<timestamp>|<fingerprint>`. The file only ever grows
//! while a session is observed; it is emptied by noise clearing and never
//! partially rewritten.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::model::stamp;
use crate::store::TranscriptStore;

const FIELD_SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp: String,
    pub fingerprint: String,
}

impl Record {
    pub fn new(at: DateTime<Utc>, fingerprint: &str) -> Self {
        Self {
            timestamp: stamp::format_stored(at),
            fingerprint: fingerprint.to_string(),
        }
    }

    /// Split on the first separator only; later `|` characters belong to the
    /// fingerprint.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.split_once(FIELD_SEPARATOR) {
            Some((timestamp, fingerprint)) => Self {
                timestamp: timestamp.trim().to_string(),
                fingerprint: fingerprint.to_string(),
            },
            None => Self {
                timestamp: line.to_string(),
                fingerprint: String::new(),
            },
        }
    }

    pub fn to_line(&self) -> String {
        format!("{}{FIELD_SEPARATOR}{}\n", self.timestamp, self.fingerprint)
    }

    pub fn display_timestamp(&self) -> String {
        stamp::display_from_stored(&self.timestamp)
    }
}

/// Create the ledger if it does not exist yet.
pub fn ensure_exists<S: TranscriptStore + ?Sized>(
    store: &S,
    log: &Path,
) -> Result<(), CoreError> {
    store.append(log, "")
}

pub fn append<S: TranscriptStore + ?Sized>(
    store: &S,
    log: &Path,
    at: DateTime<Utc>,
    fingerprint: &str,
) -> Result<(), CoreError> {
    store.append(log, &Record::new(at, fingerprint).to_line())
}

/// Append one record per fingerprint, all stamped `at`, in a single write.
pub fn append_all<'a, S, I>(
    store: &S,
    log: &Path,
    at: DateTime<Utc>,
    fingerprints: I,
) -> Result<usize, CoreError>
where
    S: TranscriptStore + ?Sized,
    I: IntoIterator<Item = &'a str>,
{
    let mut lines = String::new();
    let mut count = 0;
    for fingerprint in fingerprints {
        lines.push_str(&Record::new(at, fingerprint).to_line());
        count += 1;
    }
    if count > 0 {
        store.append(log, &lines)?;
    }
    Ok(count)
}

/// Non-blank lines as written, without collapsing duplicates.
pub fn raw_lines<S: TranscriptStore + ?Sized>(
    store: &S,
    log: &Path,
) -> Result<Vec<String>, CoreError> {
    if !store.exists(log) {
        return Ok(Vec::new());
    }
    Ok(store
        .read(log)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn raw_count<S: TranscriptStore + ?Sized>(store: &S, log: &Path) -> Result<usize, CoreError> {
    Ok(raw_lines(store, log)?.len())
}

/// Records with immediately repeated lines collapsed into one.
pub fn read<S: TranscriptStore + ?Sized>(
    store: &S,
    log: &Path,
) -> Result<Vec<Record>, CoreError> {
    let mut lines = raw_lines(store, log)?;
    lines.dedup();
    Ok(lines.iter().map(|line| Record::parse(line)).collect())
}

pub fn clear<S: TranscriptStore + ?Sized>(store: &S, log: &Path) -> Result<(), CoreError> {
    store.truncate(log)
}
