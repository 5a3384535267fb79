use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::Settings;
use crate::error::CoreError;

use super::{Layout, TranscriptStore};

/// Transcript store backed by the real filesystem.
#[derive(Debug, Clone)]
pub struct FsStore {
    layout: Layout,
}

impl FsStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn open(settings: &Settings) -> Self {
        Self::new(settings.layout())
    }
}

impl TranscriptStore for FsStore {
    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn list(&self) -> Result<Vec<PathBuf>, CoreError> {
        let entries = match fs::read_dir(self.layout.history_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut transcripts = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if self.layout.is_transcript(&path) && path.is_file() {
                transcripts.push(path);
            }
        }
        transcripts.sort();
        Ok(transcripts)
    }

    fn modified(&self, path: &Path) -> Result<SystemTime, CoreError> {
        Ok(fs::metadata(path)?.modified()?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> Result<String, CoreError> {
        let bytes = fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn append(&self, path: &Path, data: &str) -> Result<(), CoreError> {
        ensure_parent(path)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        if data.is_empty() {
            return Ok(());
        }
        fs2::FileExt::lock_exclusive(&file).map_err(CoreError::Io)?;
        let written = (&file).write_all(data.as_bytes());
        fs2::FileExt::unlock(&file).map_err(CoreError::Io)?;
        Ok(written?)
    }

    fn truncate(&self, path: &Path) -> Result<(), CoreError> {
        ensure_parent(path)?;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(())
    }

    fn atomic_replace(&self, path: &Path, data: &str) -> Result<(), CoreError> {
        let mut tmp_name = path
            .file_name()
            .ok_or_else(|| CoreError::NotFound(path.to_path_buf()))?
            .to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        let result = write_synced(&tmp, data).and_then(|()| fs::rename(&tmp, path));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        Ok(result?)
    }
}

fn ensure_parent(path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn write_synced(path: &Path, data: &str) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.sync_all()
}
