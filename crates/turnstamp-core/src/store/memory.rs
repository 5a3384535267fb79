use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use crate::error::CoreError;

use super::{Layout, TranscriptStore};

#[derive(Debug, Clone)]
struct Entry {
    data: String,
    modified: SystemTime,
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<PathBuf, Entry>,
    clock: u64,
}

impl State {
    /// Every write advances a logical clock so mtimes are strictly ordered.
    fn tick(&mut self) -> SystemTime {
        self.clock += 1;
        SystemTime::UNIX_EPOCH + Duration::from_secs(self.clock)
    }
}

/// In-memory transcript store with deterministic modification times.
#[derive(Debug)]
pub struct MemoryStore {
    layout: Layout,
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create or overwrite a file.
    pub fn insert(&self, path: impl Into<PathBuf>, data: &str) {
        let mut state = self.state();
        let modified = state.tick();
        state.files.insert(
            path.into(),
            Entry {
                data: data.to_string(),
                modified,
            },
        );
    }

    /// Advance a file's modification time without changing it.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let mut state = self.state();
        let modified = state.tick();
        if let Some(entry) = state.files.get_mut(path.as_ref()) {
            entry.modified = modified;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.state().files.remove(path.as_ref());
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state()
            .files
            .get(path.as_ref())
            .map(|entry| entry.data.clone())
    }

    fn write(&self, path: &Path, update: impl FnOnce(&mut String)) {
        let mut state = self.state();
        let modified = state.tick();
        let entry = state.files.entry(path.to_path_buf()).or_insert(Entry {
            data: String::new(),
            modified,
        });
        update(&mut entry.data);
        entry.modified = modified;
    }
}

impl TranscriptStore for MemoryStore {
    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn list(&self) -> Result<Vec<PathBuf>, CoreError> {
        Ok(self
            .state()
            .files
            .keys()
            .filter(|path| self.layout.is_transcript(path))
            .cloned()
            .collect())
    }

    fn modified(&self, path: &Path) -> Result<SystemTime, CoreError> {
        self.state()
            .files
            .get(path)
            .map(|entry| entry.modified)
            .ok_or_else(|| CoreError::NotFound(path.to_path_buf()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.state().files.contains_key(path)
    }

    fn read(&self, path: &Path) -> Result<String, CoreError> {
        self.contents(path)
            .ok_or_else(|| CoreError::NotFound(path.to_path_buf()))
    }

    fn append(&self, path: &Path, data: &str) -> Result<(), CoreError> {
        self.write(path, |contents| contents.push_str(data));
        Ok(())
    }

    fn truncate(&self, path: &Path) -> Result<(), CoreError> {
        self.write(path, String::clear);
        Ok(())
    }

    fn atomic_replace(&self, path: &Path, data: &str) -> Result<(), CoreError> {
        self.write(path, |contents| *contents = data.to_string());
        Ok(())
    }
}
