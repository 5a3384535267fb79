use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::CaptureError;

const HANDOFF_PREFIX: &str = "turnstamp_observer_";

/// Identity of a running observer, published once it has picked a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverHandle {
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
}

/// Handoff artifact through which an observer announces itself to the
/// process that spawned it. It is created empty before the observer starts;
/// non-empty content means the observer is ready.
#[derive(Debug, Clone)]
pub struct Handoff {
    path: PathBuf,
}

impl Handoff {
    /// The artifact for observers spawned by `parent_pid`.
    pub fn for_parent(dir: &Path, parent_pid: u32) -> Self {
        Self {
            path: dir.join(format!("{HANDOFF_PREFIX}{parent_pid}")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log file for the observer's own diagnostics.
    pub fn log_path(&self) -> PathBuf {
        self.sibling("log")
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }

    /// Create the artifact empty, discarding anything left from an earlier run.
    pub fn precreate(&self) -> Result<(), CaptureError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, "")?;
        Ok(())
    }

    /// Publish the handle. The document is written aside and renamed into
    /// place so a polling reader never sees it half written.
    pub fn publish(&self, handle: &ObserverHandle) -> Result<(), CaptureError> {
        let json = serde_json::to_string(handle)?;
        let tmp = self.sibling("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            CaptureError::Handoff(format!("Failed to publish {}: {e}", self.path.display()))
        })
    }

    /// The published handle, if any. Accepts a bare pid as well as JSON.
    pub fn read(&self) -> Option<ObserverHandle> {
        let text = fs::read_to_string(&self.path).ok()?;
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        match serde_json::from_str::<ObserverHandle>(text) {
            Ok(handle) => Some(handle),
            Err(e) => match text.parse::<u32>() {
                Ok(pid) => Some(ObserverHandle { pid, target: None }),
                Err(_) => {
                    tracing::debug!("Unreadable handoff {}: {e}", self.path.display());
                    None
                }
            },
        }
    }

    /// Poll until the handle is published or `timeout` elapses.
    pub fn wait_ready(&self, timeout: Duration, tick: Duration) -> Option<ObserverHandle> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(handle) = self.read() {
                return Some(handle);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(tick);
        }
    }

    pub fn remove(&self) {
        let _ = fs::remove_file(&self.path);
        let _ = fs::remove_file(self.sibling("tmp"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_precreate_publish_read_remove() {
        let tmp = TempDir::new().unwrap();
        let handoff = Handoff::for_parent(tmp.path(), 4242);
        assert_eq!(handoff.path(), tmp.path().join("turnstamp_observer_4242"));
        assert!(handoff.read().is_none());

        handoff.precreate().unwrap();
        assert!(handoff.path().exists());
        assert!(handoff.read().is_none());

        let handle = ObserverHandle {
            pid: 777,
            target: Some(PathBuf::from("/p/.specstory/history/s.md")),
        };
        handoff.publish(&handle).unwrap();
        assert_eq!(handoff.read(), Some(handle));
        assert!(!tmp.path().join("turnstamp_observer_4242.tmp").exists());

        handoff.remove();
        assert!(!handoff.path().exists());
    }

    #[test]
    fn test_read_bare_pid() {
        let tmp = TempDir::new().unwrap();
        let handoff = Handoff::for_parent(tmp.path(), 1);
        fs::write(handoff.path(), "1234\n").unwrap();
        assert_eq!(
            handoff.read(),
            Some(ObserverHandle {
                pid: 1234,
                target: None
            })
        );

        fs::write(handoff.path(), "{\"pid\":").unwrap();
        assert!(handoff.read().is_none());
    }

    #[test]
    fn test_wait_ready_times_out_on_empty_artifact() {
        let tmp = TempDir::new().unwrap();
        let handoff = Handoff::for_parent(tmp.path(), 9);
        handoff.precreate().unwrap();

        let started = Instant::now();
        let ready = handoff.wait_ready(Duration::from_millis(150), Duration::from_millis(20));
        assert!(ready.is_none());
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_wait_ready_sees_late_publish() {
        let tmp = TempDir::new().unwrap();
        let handoff = Handoff::for_parent(tmp.path(), 10);
        handoff.precreate().unwrap();

        let writer = handoff.clone();
        let publisher = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            writer
                .publish(&ObserverHandle {
                    pid: 55,
                    target: None,
                })
                .unwrap();
        });

        let ready = handoff.wait_ready(Duration::from_secs(5), Duration::from_millis(10));
        publisher.join().unwrap();
        assert_eq!(ready.map(|h| h.pid), Some(55));
    }
}
