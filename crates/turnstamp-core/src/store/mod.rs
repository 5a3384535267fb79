mod fs;
mod memory;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::CoreError;

pub use fs::FsStore;
pub use memory::MemoryStore;

const TRANSCRIPT_EXTENSION: &str = "md";
const LEDGER_EXTENSION: &str = "timestamps";

/// Where transcripts and their ledgers live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    history_dir: PathBuf,
    ledger_dir: PathBuf,
}

impl Layout {
    pub fn new(history_dir: impl Into<PathBuf>, ledger_dir: impl Into<PathBuf>) -> Self {
        Self {
            history_dir: history_dir.into(),
            ledger_dir: ledger_dir.into(),
        }
    }

    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }

    pub fn ledger_dir(&self) -> &Path {
        &self.ledger_dir
    }

    /// A transcript is a `.md` file directly inside the history directory.
    pub fn is_transcript(&self, path: &Path) -> bool {
        path.parent() == Some(self.history_dir.as_path())
            && path.extension().is_some_and(|e| e == TRANSCRIPT_EXTENSION)
    }

    /// Ledger for a transcript: same base name, ledger directory, `.timestamps`.
    pub fn ledger_path(&self, transcript: &Path) -> PathBuf {
        let stem = transcript
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.ledger_dir.join(format!("{stem}.{LEDGER_EXTENSION}"))
    }
}

/// Access to the shared transcript directory and its ledgers.
///
/// Paths passed in are the ones handed out by [`TranscriptStore::list`] or
/// [`Layout::ledger_path`].
pub trait TranscriptStore {
    fn layout(&self) -> &Layout;

    /// Transcripts currently in the history directory, sorted by path.
    fn list(&self) -> Result<Vec<PathBuf>, CoreError>;

    fn modified(&self, path: &Path) -> Result<SystemTime, CoreError>;

    fn exists(&self, path: &Path) -> bool;

    /// Read a file as text. Invalid UTF-8 is replaced.
    fn read(&self, path: &Path) -> Result<String, CoreError>;

    /// Add-only write; creates the file (and its parents) if missing.
    fn append(&self, path: &Path, data: &str) -> Result<(), CoreError>;

    /// Create the file if missing and make it empty.
    fn truncate(&self, path: &Path) -> Result<(), CoreError>;

    /// Replace the file's contents so readers never see a partial write.
    fn atomic_replace(&self, path: &Path, data: &str) -> Result<(), CoreError>;

    /// The transcript with the most recent modification time.
    fn latest(&self) -> Result<Option<PathBuf>, CoreError> {
        let mut latest: Option<(PathBuf, SystemTime)> = None;
        for path in self.list()? {
            let Ok(modified) = self.modified(&path) else {
                continue;
            };
            match &latest {
                Some((_, best)) if *best >= modified => {}
                _ => latest = Some((path, modified)),
            }
        }
        Ok(latest.map(|(path, _)| path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_path() {
        let layout = Layout::new("/p/.specstory/history", "/p/.specstory/timestamps");
        assert_eq!(
            layout.ledger_path(Path::new("/p/.specstory/history/2025-01-01_10-00Z-fix.md")),
            PathBuf::from("/p/.specstory/timestamps/2025-01-01_10-00Z-fix.timestamps")
        );
    }

    #[test]
    fn test_is_transcript() {
        let layout = Layout::new("/p/h", "/p/t");
        assert!(layout.is_transcript(Path::new("/p/h/a.md")));
        assert!(!layout.is_transcript(Path::new("/p/h/a.txt")));
        assert!(!layout.is_transcript(Path::new("/p/h/nested/a.md")));
        assert!(!layout.is_transcript(Path::new("/p/t/a.md")));
    }

    #[test]
    fn test_latest_transcript() {
        let store = MemoryStore::new(Layout::new("/p/h", "/p/t"));
        assert_eq!(store.latest().unwrap(), None);

        store.insert("/p/h/b.md", "b");
        store.insert("/p/h/a.md", "a");
        assert_eq!(store.latest().unwrap(), Some(PathBuf::from("/p/h/a.md")));

        store.touch("/p/h/b.md");
        assert_eq!(store.latest().unwrap(), Some(PathBuf::from("/p/h/b.md")));
    }
}
