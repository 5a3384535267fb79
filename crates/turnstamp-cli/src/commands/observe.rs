use std::path::PathBuf;
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Args;

use turnstamp_capture::handoff::Handoff;
use turnstamp_capture::observer::{MtimeSnapshot, Observer};
use turnstamp_core::config::Settings;
use turnstamp_core::store::FsStore;

#[derive(Args)]
pub struct ObserveArgs {
    /// Process that spawned the observer and will stop it
    #[arg(long)]
    pub parent_pid: u32,

    /// Project root containing `.specstory/`
    #[arg(long)]
    pub root: PathBuf,

    /// When the session started, in milliseconds since the Unix epoch
    #[arg(long)]
    pub started_at_ms: Option<u64>,
}

pub fn run(args: &ObserveArgs) -> Result<()> {
    let settings = Settings::load(&args.root);
    let store = FsStore::open(&settings);
    let started_at = args
        .started_at_ms
        .map(|ms| UNIX_EPOCH + Duration::from_millis(ms));

    let snapshot = MtimeSnapshot::capture(&store, started_at);
    tracing::debug!("Observer snapshot holds {} transcripts", snapshot.len());

    let handoff = Handoff::for_parent(&settings.handoff_dir, args.parent_pid);
    Observer::new(store, settings.poll_interval)
        .watch_parent(args.parent_pid)
        .run(&snapshot, &handoff)
        .context("Observer failed")
}
