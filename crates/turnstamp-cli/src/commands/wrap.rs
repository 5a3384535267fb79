use std::ffi::OsString;

use anyhow::{Context, Result};

use turnstamp_capture::discover::ToolLocator;
use turnstamp_capture::session::Session;
use turnstamp_core::config::Settings;

use crate::output;

/// Run the recording tool with `args` and return its exit code.
pub fn run(args: &[OsString]) -> Result<i32> {
    let root = std::env::current_dir().context("Failed to get current directory")?;
    let settings = Settings::load(&root);
    let tool = ToolLocator::from_env().resolve();

    let session = Session::new(settings, tool);
    if session.is_interactive(args) {
        output::print_banner();
    }

    let outcome = session
        .run(args)
        .with_context(|| format!("Failed to run {}", session.tool().display()))?;

    for (path, e) in &outcome.merge.failed {
        output::print_merge_failure(path, e);
    }
    Ok(outcome.exit_code)
}
