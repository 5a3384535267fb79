use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use turnstamp_core::error::CoreError;
use turnstamp_core::extract::extract_turns;
use turnstamp_core::ledger;
use turnstamp_core::store::TranscriptStore;

use crate::error::CaptureError;
use crate::handoff::{Handoff, ObserverHandle};
use crate::sys;

/// Absorbs filesystem timestamp granularity when comparing mtimes.
const MTIME_EPSILON: Duration = Duration::from_micros(1);

/// Modification times of the transcripts present when observation began.
#[derive(Debug, Clone, Default)]
pub struct MtimeSnapshot {
    initial: HashMap<PathBuf, SystemTime>,
    started_at: Option<SystemTime>,
}

impl MtimeSnapshot {
    /// Record every transcript's mtime. When `started_at` is given, any
    /// transcript modified after it also counts as touched, which covers
    /// writes that land before the snapshot is taken.
    pub fn capture<S: TranscriptStore + ?Sized>(
        store: &S,
        started_at: Option<SystemTime>,
    ) -> Self {
        let mut initial = HashMap::new();
        match store.list() {
            Ok(transcripts) => {
                for path in transcripts {
                    if let Ok(modified) = store.modified(&path) {
                        initial.insert(path, modified);
                    }
                }
            }
            Err(e) => tracing::debug!("Cannot list transcripts for snapshot: {e}"),
        }
        Self {
            initial,
            started_at,
        }
    }

    pub fn len(&self) -> usize {
        self.initial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.initial.is_empty()
    }

    fn touched(&self, path: &Path, modified: SystemTime) -> bool {
        if self.started_at.is_some_and(|started| modified > started) {
            return true;
        }
        match self.initial.get(path) {
            None => true,
            Some(before) => modified > *before + MTIME_EPSILON,
        }
    }

    /// The most recently modified transcript that appeared or changed since
    /// the snapshot, if any.
    pub fn candidate<S: TranscriptStore + ?Sized>(&self, store: &S) -> Option<PathBuf> {
        let transcripts = store.list().ok()?;
        transcripts
            .into_iter()
            .filter_map(|path| {
                let modified = store.modified(&path).ok()?;
                self.touched(&path, modified).then_some((path, modified))
            })
            .max_by_key(|(_, modified)| *modified)
            .map(|(path, _)| path)
    }
}

/// Records appended during one polling pass.
#[derive(Debug, Default)]
pub struct TickReport {
    pub appended: Vec<(PathBuf, usize)>,
}

impl TickReport {
    pub fn total(&self) -> usize {
        self.appended.iter().map(|(_, n)| n).sum()
    }
}

/// Keeps every transcript's ledger in step with the turns it contains.
pub struct Observer<S> {
    store: S,
    poll_interval: Duration,
    parent_pid: Option<u32>,
}

impl<S: TranscriptStore> Observer<S> {
    pub fn new(store: S, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
            parent_pid: None,
        }
    }

    /// Stop observing once `pid` has exited.
    pub fn watch_parent(mut self, pid: u32) -> Self {
        self.parent_pid = Some(pid);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn parent_gone(&self) -> bool {
        self.parent_pid.is_some_and(|pid| !sys::process_alive(pid))
    }

    /// Append one record, stamped `now`, per turn that has no record yet.
    pub fn observe(&self, transcript: &Path, now: DateTime<Utc>) -> Result<usize, CoreError> {
        let log = self.store.layout().ledger_path(transcript);
        ledger::ensure_exists(&self.store, &log)?;

        let turns = extract_turns(&self.store.read(transcript)?);
        let recorded = ledger::raw_count(&self.store, &log)?;
        match turns.get(recorded..) {
            Some(new) if !new.is_empty() => ledger::append_all(
                &self.store,
                &log,
                now,
                new.iter().map(|t| t.fingerprint.as_str()),
            ),
            _ => Ok(0),
        }
    }

    /// One pass over every transcript. Per-file errors are skipped; the
    /// file is retried on the next pass.
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let transcripts = match self.store.list() {
            Ok(transcripts) => transcripts,
            Err(e) => {
                tracing::debug!("Cannot list transcripts: {e}");
                return report;
            }
        };

        for transcript in transcripts {
            match self.observe(&transcript, now) {
                Ok(0) => {}
                Ok(appended) => {
                    tracing::debug!("{}: {appended} new turns", transcript.display());
                    report.appended.push((transcript, appended));
                }
                Err(e) => tracing::debug!("Skipping {} this tick: {e}", transcript.display()),
            }
        }
        report
    }

    /// Poll until a transcript is created or touched. Returns `None` if the
    /// parent exits first.
    pub fn wait_for_target(&self, snapshot: &MtimeSnapshot) -> Option<PathBuf> {
        loop {
            if let Some(target) = snapshot.candidate(&self.store) {
                return Some(target);
            }
            if self.parent_gone() {
                return None;
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Discover the target, publish the handle, then keep ledgers current
    /// until the process is signalled or the parent exits.
    pub fn run(&self, snapshot: &MtimeSnapshot, handoff: &Handoff) -> Result<(), CaptureError> {
        let Some(target) = self.wait_for_target(snapshot) else {
            tracing::info!("Parent exited before any transcript changed");
            return Ok(());
        };
        tracing::info!("Observing {}", target.display());

        ledger::ensure_exists(&self.store, &self.store.layout().ledger_path(&target))?;
        handoff.publish(&ObserverHandle {
            pid: std::process::id(),
            target: Some(target),
        })?;

        loop {
            self.tick(Utc::now());
            if self.parent_gone() {
                tracing::info!("Parent exited, observer stopping");
                handoff.remove();
                return Ok(());
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}
