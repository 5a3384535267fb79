use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use turnstamp_core::config::Settings;
use turnstamp_core::merge::{self, MergeReport};
use turnstamp_core::store::{FsStore, TranscriptStore};

use crate::error::CaptureError;
use crate::supervisor::{StopOutcome, Supervisor};

/// Polling ticks to wait after the tool exits so the observer can record
/// the final turns.
const FLUSH_TICKS: u32 = 5;
/// Ticks to wait after stopping the observer before rewriting transcripts.
const SETTLE_TICKS: u32 = 2;

/// Result of one wrapped invocation of the recording tool.
#[derive(Debug)]
pub struct SessionOutcome {
    /// The tool's exit status, to be passed on unchanged.
    pub exit_code: i32,
    /// Transcript the observer committed to, if it got that far.
    pub target: Option<PathBuf>,
    pub stop: StopOutcome,
    pub merge: MergeReport,
}

/// One invocation of the recording tool with timestamp capture around it.
pub struct Session {
    settings: Settings,
    tool: PathBuf,
    /// Binary that runs the observer; the current executable by default.
    observer_program: Option<PathBuf>,
}

impl Session {
    pub fn new(settings: Settings, tool: PathBuf) -> Self {
        Self {
            settings,
            tool,
            observer_program: None,
        }
    }

    pub fn with_observer_program(mut self, program: PathBuf) -> Self {
        self.observer_program = Some(program);
        self
    }

    pub fn tool(&self) -> &std::path::Path {
        &self.tool
    }

    /// Whether the arguments start an interactive recording.
    pub fn is_interactive(&self, args: &[OsString]) -> bool {
        args.first()
            .is_some_and(|first| *first == *self.settings.interactive_command)
    }

    /// Observe, run the tool in the foreground, stop the observer, merge.
    pub fn run(&self, args: &[OsString]) -> Result<SessionOutcome, CaptureError> {
        let store = FsStore::open(&self.settings);
        std::fs::create_dir_all(store.layout().ledger_dir())?;

        match store.latest() {
            Ok(Some(latest)) => tracing::debug!("Latest transcript: {}", latest.display()),
            Ok(None) => tracing::debug!("No transcripts yet"),
            Err(e) => tracing::debug!("Cannot list transcripts: {e}"),
        }

        let mut supervisor = match &self.observer_program {
            Some(program) => Supervisor::with_program(self.settings.clone(), program.clone()),
            None => Supervisor::new(self.settings.clone())?,
        };
        if let Err(e) = supervisor.start() {
            tracing::warn!("Timestamp observer not started: {e}");
        }

        let status = Command::new(&self.tool).args(args).status();

        std::thread::sleep(self.settings.poll_interval * FLUSH_TICKS);
        let target = supervisor.target();
        let stop = supervisor.stop();
        std::thread::sleep(self.settings.poll_interval * SETTLE_TICKS);

        if let Some(target) = &target {
            match supervisor.clear_noise(&store, target) {
                Ok(true) => tracing::debug!("No dialogue in {}, ledger cleared", target.display()),
                Ok(false) => {}
                Err(e) => tracing::debug!("Cannot check {}: {e}", target.display()),
            }
        }

        let status = status.map_err(|source| CaptureError::Spawn {
            program: self.tool.display().to_string(),
            source,
        })?;

        let merge = merge::merge_all(&store)?;
        tracing::info!(
            "Merged timestamps: {} headers stamped, {} transcripts failed",
            merge.stamped_headers(),
            merge.failed.len()
        );

        Ok(SessionOutcome {
            exit_code: exit_code(status),
            target,
            stop,
            merge,
        })
    }
}

/// Exit code to report for the tool. A signal-terminated tool maps to
/// `128 + signal` as a shell would.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
