use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CoreError;
use crate::store::Layout;

/// Transcripts written by the recording tool, relative to the project root.
pub const HISTORY_DIR: &str = ".specstory/history";
/// Per-transcript timestamp ledgers, relative to the project root.
pub const LEDGER_DIR: &str = ".specstory/timestamps";

/// Subcommand of the recording tool that starts an interactive session.
pub const INTERACTIVE_COMMAND: &str = "run";

/// Environment variables that may name the real recording tool, in lookup order.
pub const TOOL_OVERRIDE_VARS: &[&str] =
    &["SPECSTORY_ORIGINAL", "SPECSTORY_REAL", "ORIGINAL_SPECSTORY"];

const POLL_MS_VAR: &str = "TURNSTAMP_POLL_MS";
const HANDOFF_DIR_VAR: &str = "TURNSTAMP_HANDOFF_DIR";

const DEFAULT_POLL: Duration = Duration::from_millis(100);
const DEFAULT_HANDOFF_WAIT: Duration = Duration::from_secs(2);
const DEFAULT_ESCALATION_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    pub poll_interval: Duration,
    /// How long `stop` waits for the observer to publish its handle.
    pub handoff_wait: Duration,
    /// Pause between the graceful and the forced termination signal.
    pub escalation_delay: Duration,
    pub handoff_dir: PathBuf,
    pub interactive_command: String,
}

impl Settings {
    /// Built-in defaults for a project rooted at `root`.
    pub fn defaults(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            poll_interval: DEFAULT_POLL,
            handoff_wait: DEFAULT_HANDOFF_WAIT,
            escalation_delay: DEFAULT_ESCALATION_DELAY,
            handoff_dir: std::env::temp_dir(),
            interactive_command: INTERACTIVE_COMMAND.to_string(),
        }
    }

    /// Defaults with overrides from the process environment.
    pub fn load(root: &Path) -> Self {
        Self::load_with(root, |key| std::env::var(key).ok())
    }

    /// Defaults with overrides from `lookup`. Invalid values are logged and ignored.
    pub fn load_with(root: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::defaults(root);

        if let Some(raw) = lookup(POLL_MS_VAR) {
            match parse_millis(&raw) {
                Ok(interval) => settings.poll_interval = interval,
                Err(e) => tracing::warn!("Ignoring {POLL_MS_VAR}: {e}"),
            }
        }

        if let Some(dir) = lookup(HANDOFF_DIR_VAR).filter(|d| !d.trim().is_empty()) {
            settings.handoff_dir = PathBuf::from(dir);
        }

        settings
    }

    pub fn layout(&self) -> Layout {
        Layout::new(self.root.join(HISTORY_DIR), self.root.join(LEDGER_DIR))
    }
}

fn parse_millis(raw: &str) -> Result<Duration, CoreError> {
    let ms: u64 = raw
        .trim()
        .parse()
        .map_err(|e| CoreError::Config(format!("invalid milliseconds {raw:?}: {e}")))?;
    if ms == 0 {
        return Err(CoreError::Config("interval must be positive".into()));
    }
    Ok(Duration::from_millis(ms))
}
