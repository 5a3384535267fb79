use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::UNIX_EPOCH;

use turnstamp_core::config::Settings;
use turnstamp_core::error::CoreError;
use turnstamp_core::merge;
use turnstamp_core::store::TranscriptStore;

use crate::error::CaptureError;
use crate::handoff::{Handoff, ObserverHandle};
use crate::sys::{self, Signal};
use crate::INTERNAL_COMMAND;

/// When set, the observer's diagnostics go to `<handoff>.log`.
const OBSERVER_LOG_VAR: &str = "TURNSTAMP_OBSERVER_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The observer never published a handle; nothing was signalled.
    NeverStarted,
    Stopped(ObserverHandle),
}

/// Starts the observer as a detached copy of this binary and stops it again.
pub struct Supervisor {
    settings: Settings,
    program: PathBuf,
    handoff: Handoff,
    child: Option<Child>,
}

impl Supervisor {
    /// Supervise observers run by the current executable.
    pub fn new(settings: Settings) -> Result<Self, CaptureError> {
        let program = std::env::current_exe()?;
        Ok(Self::with_program(settings, program))
    }

    pub fn with_program(settings: Settings, program: PathBuf) -> Self {
        let handoff = Handoff::for_parent(&settings.handoff_dir, std::process::id());
        Self {
            settings,
            program,
            handoff,
            child: None,
        }
    }

    pub fn handoff(&self) -> &Handoff {
        &self.handoff
    }

    /// Spawn the observer and return without waiting for it.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.handoff.precreate()?;

        let started_at_ms = UNIX_EPOCH
            .elapsed()
            .map(|d| d.as_millis().to_string())
            .unwrap_or_else(|_| "0".into());

        let mut cmd = Command::new(&self.program);
        cmd.arg(INTERNAL_COMMAND)
            .arg("observe")
            .arg("--parent-pid")
            .arg(std::process::id().to_string())
            .arg("--root")
            .arg(&self.settings.root)
            .arg("--started-at-ms")
            .arg(started_at_ms)
            .env("TURNSTAMP_HANDOFF_DIR", &self.settings.handoff_dir)
            .env(
                "TURNSTAMP_POLL_MS",
                self.settings.poll_interval.as_millis().to_string(),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::null());

        let log = std::env::var_os(OBSERVER_LOG_VAR).and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.handoff.log_path())
                .ok()
        });
        match log {
            Some(file) => cmd.stderr(Stdio::from(file)),
            None => cmd.stderr(Stdio::null()),
        };

        sys::detach(&mut cmd);
        let child = cmd.spawn().map_err(|source| CaptureError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;
        tracing::info!("Observer spawned with pid {}", child.id());
        self.child = Some(child);
        Ok(())
    }

    /// The transcript the observer committed to, once it has published.
    pub fn target(&self) -> Option<PathBuf> {
        self.handoff.read().and_then(|handle| handle.target)
    }

    /// Stop the observer: graceful signal to its process group, a short
    /// pause, then a forced kill regardless of whether it already exited.
    pub fn stop(&mut self) -> StopOutcome {
        let ready = self
            .handoff
            .wait_ready(self.settings.handoff_wait, self.settings.poll_interval);

        let Some(handle) = ready else {
            tracing::debug!("Observer never published a handle");
            self.handoff.remove();
            if let Some(mut child) = self.child.take() {
                // Still waiting for a transcript to change; it has nothing to flush.
                let _ = child.kill();
                let _ = child.wait();
            }
            return StopOutcome::NeverStarted;
        };

        if let Err(e) = sys::signal_group(handle.pid, Signal::Terminate) {
            tracing::debug!("SIGTERM to observer {} failed: {e}", handle.pid);
        }
        std::thread::sleep(self.settings.escalation_delay);
        if let Err(e) = sys::signal_group(handle.pid, Signal::Kill) {
            tracing::debug!("SIGKILL to observer {} failed: {e}", handle.pid);
        }

        self.handoff.remove();
        // Reaping last keeps the pid from being reused while it is signalled.
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
        tracing::info!("Observer {} stopped", handle.pid);
        StopOutcome::Stopped(handle)
    }

    /// Empty the ledger of a transcript that never received real dialogue.
    pub fn clear_noise<S: TranscriptStore + ?Sized>(
        &self,
        store: &S,
        transcript: &Path,
    ) -> Result<bool, CoreError> {
        merge::clear_noise(store, transcript)
    }
}
