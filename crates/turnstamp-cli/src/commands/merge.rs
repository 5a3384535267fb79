use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use turnstamp_core::config::Settings;
use turnstamp_core::merge;
use turnstamp_core::store::FsStore;

use crate::output;

#[derive(Args)]
pub struct MergeArgs {
    /// Project root containing `.specstory/` (default: current directory)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Transcript to merge (default: every transcript in the history)
    pub path: Option<PathBuf>,
}

pub fn run(args: &MergeArgs) -> Result<()> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let settings = Settings::load(&root);
    let store = FsStore::open(&settings);

    if let Some(path) = &args.path {
        let path = if path.is_absolute() {
            path.clone()
        } else {
            std::env::current_dir()?.join(path)
        };
        let outcome = merge::merge_transcript(&store, &path)
            .with_context(|| format!("Failed to merge {}", path.display()))?;
        output::print_merge_outcome(&path, &outcome);
        return Ok(());
    }

    let report = merge::merge_all(&store).context("Failed to list transcripts")?;
    for (path, outcome) in &report.merged {
        output::print_merge_outcome(path, outcome);
    }
    for (path, e) in &report.failed {
        output::print_merge_failure(path, e);
    }
    if !report.failed.is_empty() {
        anyhow::bail!("{} transcripts could not be merged", report.failed.len());
    }
    if report.merged.is_empty() {
        println!("No transcripts in {}", settings.layout().history_dir().display());
    }
    Ok(())
}
