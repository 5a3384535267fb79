//! Rewrites transcript headers to carry the timestamps recorded in their ledgers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::extract::{extract_turns, has_user_content};
use crate::ledger::{self, Record};
use crate::model::{normalize, TurnHeader};
use crate::store::TranscriptStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No user turn with content; the ledger was emptied and the transcript left alone.
    NoUserContent,
    Stamped {
        /// Headers that now carry a timestamp.
        headers: usize,
        /// Records synthesized for turns the observer never saw.
        backfilled: usize,
        /// Whether the transcript file was rewritten.
        rewritten: bool,
    },
}

/// Per-transcript results of [`merge_all`].
#[derive(Debug, Default)]
pub struct MergeReport {
    pub merged: Vec<(PathBuf, MergeOutcome)>,
    pub failed: Vec<(PathBuf, CoreError)>,
}

impl MergeReport {
    pub fn stamped_headers(&self) -> usize {
        self.merged
            .iter()
            .map(|(_, outcome)| match outcome {
                MergeOutcome::Stamped { headers, .. } => *headers,
                MergeOutcome::NoUserContent => 0,
            })
            .sum()
    }
}

/// Empty the transcript's ledger when the session produced no user turn with
/// content. Returns whether the ledger was cleared.
pub fn clear_noise<S: TranscriptStore + ?Sized>(
    store: &S,
    transcript: &Path,
) -> Result<bool, CoreError> {
    let turns = extract_turns(&store.read(transcript)?);
    if has_user_content(&turns) {
        return Ok(false);
    }
    ledger::clear(store, &store.layout().ledger_path(transcript))?;
    Ok(true)
}

pub fn merge_transcript<S: TranscriptStore + ?Sized>(
    store: &S,
    transcript: &Path,
) -> Result<MergeOutcome, CoreError> {
    merge_transcript_at(store, transcript, Utc::now())
}

/// Merge with `now` as the timestamp for backfilled records.
pub fn merge_transcript_at<S: TranscriptStore + ?Sized>(
    store: &S,
    transcript: &Path,
    now: DateTime<Utc>,
) -> Result<MergeOutcome, CoreError> {
    let text = store.read(transcript)?;
    let turns = extract_turns(&text);
    let log = store.layout().ledger_path(transcript);
    ledger::ensure_exists(store, &log)?;

    if !has_user_content(&turns) {
        ledger::clear(store, &log)?;
        tracing::debug!("No user content in {}, ledger cleared", transcript.display());
        return Ok(MergeOutcome::NoUserContent);
    }

    let recorded = ledger::read(store, &log)?.len();
    let backfilled = match turns.get(recorded..) {
        Some(missing) if !missing.is_empty() => ledger::append_all(
            store,
            &log,
            now,
            missing.iter().map(|t| t.fingerprint.as_str()),
        )?,
        _ => 0,
    };

    let records = ledger::read(store, &log)?;
    let (merged, headers) = stamp_headers(&text, &records);
    let rewritten = merged != text;
    if rewritten {
        store.atomic_replace(transcript, &merged)?;
    }

    tracing::debug!(
        "Merged {}: {headers} headers stamped, {backfilled} backfilled",
        transcript.display()
    );
    Ok(MergeOutcome::Stamped {
        headers,
        backfilled,
        rewritten,
    })
}

/// Merge every transcript in the store. A failure on one transcript does not
/// stop the others.
pub fn merge_all<S: TranscriptStore + ?Sized>(store: &S) -> Result<MergeReport, CoreError> {
    let mut report = MergeReport::default();
    for transcript in store.list()? {
        match merge_transcript(store, &transcript) {
            Ok(outcome) => report.merged.push((transcript, outcome)),
            Err(e) => {
                tracing::warn!("Failed to merge timestamps into {}: {e}", transcript.display());
                report.failed.push((transcript, e));
            }
        }
    }
    Ok(report)
}

/// Each header line, in order, takes the next record's timestamp. Headers
/// past the last record are left as they are.
fn stamp_headers(text: &str, records: &[Record]) -> (String, usize) {
    let normalized = normalize(text);
    let mut out = String::with_capacity(normalized.len() + records.len() * 32);
    let mut pending = records.iter();
    let mut stamped = 0;
    for line in normalized.lines() {
        let header = TurnHeader::parse(line);
        let record = header.and_then(|_| pending.next());
        match (header, record) {
            (Some(header), Some(record)) if !record.timestamp.is_empty() => {
                out.push_str(&header.stamped(&record.display_timestamp()));
                stamped += 1;
            }
            _ => out.push_str(line),
        }
        out.push('\n');
    }
    (out, stamped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FsStore, Layout, MemoryStore};
    use chrono::TimeZone;
    use tempfile::TempDir;

    const TRANSCRIPT: &str = "/p/h/session.md";
    const LEDGER: &str = "/p/t/session.timestamps";

    fn store_with(text: &str) -> MemoryStore {
        let store = MemoryStore::new(Layout::new("/p/h", "/p/t"));
        store.insert(TRANSCRIPT, text);
        store
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 4, 10, minute, 0).unwrap()
    }

    #[test]
    fn test_merge_with_empty_ledger() {
        let store = store_with("_**User**_\nhello\n_**Agent**_\nworld\n");
        store.insert(LEDGER, "");

        let outcome = merge_transcript_at(&store, Path::new(TRANSCRIPT), at(7)).unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::Stamped {
                headers: 2,
                backfilled: 2,
                rewritten: true
            }
        );
        assert_eq!(
            store.contents(LEDGER).unwrap(),
            "2025-05-04T10:07:00Z|hello\n2025-05-04T10:07:00Z|world\n"
        );
        assert_eq!(
            store.contents(TRANSCRIPT).unwrap(),
            "_**User (2025-05-04 10:07:00 UTC)**_\nhello\n\
             _**Agent (2025-05-04 10:07:00 UTC)**_\nworld\n"
        );
    }

    #[test]
    fn test_uses_recorded_timestamps() {
        let store = store_with("_**User**_\n\nhi\n\n---\n\n_**Agent (model o3, mode Ask)**_\n\nhey\n");
        store.insert(
            LEDGER,
            "2025-05-04T10:01:00Z|hi\n2025-05-04T10:02:00Z|hey\n",
        );

        merge_transcript_at(&store, Path::new(TRANSCRIPT), at(30)).unwrap();
        let merged = store.contents(TRANSCRIPT).unwrap();
        assert!(merged.contains("_**User (2025-05-04 10:01:00 UTC)**_"));
        assert!(merged.contains("_**Agent (model o3, mode Ask) (2025-05-04 10:02:00 UTC)**_"));
        assert!(merged.contains("\n---\n"));
    }

    #[test]
    fn test_backfill_completes_partial_ledger() {
        let store = store_with("_**User**_\na\n_**Agent**_\nb\n_**User**_\nc\n_**Agent**_\nd\n");
        store.insert(LEDGER, "2025-05-04T10:01:00Z|a\n");

        let outcome = merge_transcript_at(&store, Path::new(TRANSCRIPT), at(9)).unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::Stamped {
                headers: 4,
                backfilled: 3,
                rewritten: true
            }
        );
        let records = ledger::read(&store, Path::new(LEDGER)).unwrap();
        let fingerprints: Vec<_> = records.iter().map(|r| r.fingerprint.as_str()).collect();
        assert_eq!(fingerprints, vec!["a", "b", "c", "d"]);
        assert_eq!(records[0].timestamp, "2025-05-04T10:01:00Z");
        assert_eq!(records[3].timestamp, "2025-05-04T10:09:00Z");
    }

    #[test]
    fn test_agent_only_transcript_is_not_stamped() {
        let original = "_**Agent**_\nstatus report\n";
        let store = store_with(original);
        store.insert(LEDGER, "2025-05-04T10:01:00Z|noise\n");

        let outcome = merge_transcript_at(&store, Path::new(TRANSCRIPT), at(1)).unwrap();
        assert_eq!(outcome, MergeOutcome::NoUserContent);
        assert_eq!(store.contents(LEDGER).unwrap(), "");
        assert_eq!(store.contents(TRANSCRIPT).unwrap(), original);
    }

    #[test]
    fn test_header_at_end_of_file_stays_unstamped() {
        let store = store_with("_**User**_");
        let outcome = merge_transcript_at(&store, Path::new(TRANSCRIPT), at(1)).unwrap();
        assert_eq!(outcome, MergeOutcome::NoUserContent);
        assert_eq!(store.contents(LEDGER).unwrap(), "");
        assert_eq!(store.contents(TRANSCRIPT).unwrap(), "_**User**_");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let store = store_with("_**User**_\nhello\n_**Agent**_\nworld\n");
        merge_transcript_at(&store, Path::new(TRANSCRIPT), at(1)).unwrap();
        let first = store.contents(TRANSCRIPT).unwrap();
        let ledger_first = store.contents(LEDGER).unwrap();

        let outcome = merge_transcript_at(&store, Path::new(TRANSCRIPT), at(45)).unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::Stamped {
                headers: 2,
                backfilled: 0,
                rewritten: false
            }
        );
        assert_eq!(store.contents(TRANSCRIPT).unwrap(), first);
        assert_eq!(store.contents(LEDGER).unwrap(), ledger_first);
    }

    #[test]
    fn test_merge_is_deterministic_for_same_ledger() {
        let text = "_**User**_\nq\n_**Agent**_\na\n";
        let ledger_text = "2025-05-04T10:01:00Z|q\n2025-05-04T10:02:00Z|a\n";

        let outputs: Vec<String> = (0..2)
            .map(|_| {
                let store = store_with(text);
                store.insert(LEDGER, ledger_text);
                merge_transcript_at(&store, Path::new(TRANSCRIPT), at(50)).unwrap();
                store.contents(TRANSCRIPT).unwrap()
            })
            .collect();
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn test_records_beyond_turns_and_duplicates() {
        let store = store_with("_**User**_\nsame\n_**Agent**_\nother\n");
        store.insert(
            LEDGER,
            "2025-05-04T10:01:00Z|same\n2025-05-04T10:01:00Z|same\n2025-05-04T10:02:00Z|other\n",
        );
        let outcome = merge_transcript_at(&store, Path::new(TRANSCRIPT), at(3)).unwrap();
        assert!(matches!(
            outcome,
            MergeOutcome::Stamped {
                headers: 2,
                backfilled: 0,
                ..
            }
        ));
        assert!(store
            .contents(TRANSCRIPT)
            .unwrap()
            .contains("_**Agent (2025-05-04 10:02:00 UTC)**_"));
    }

    #[test]
    fn test_empty_header_is_stamped_in_order() {
        let store = store_with("_**User**_\nq\n_**Agent**_\n\n_**User**_\nq2\n");
        store.insert(LEDGER, "2025-05-04T10:01:00Z|q\n");

        let outcome = merge_transcript_at(&store, Path::new(TRANSCRIPT), at(3)).unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::Stamped {
                headers: 3,
                backfilled: 2,
                rewritten: true
            }
        );
        assert_eq!(
            store.contents(LEDGER).unwrap(),
            "2025-05-04T10:01:00Z|q\n\
             2025-05-04T10:03:00Z|_**User**_\n\
             2025-05-04T10:03:00Z|q2\n"
        );
        assert_eq!(
            store.contents(TRANSCRIPT).unwrap(),
            "_**User (2025-05-04 10:01:00 UTC)**_\nq\n\
             _**Agent (2025-05-04 10:03:00 UTC)**_\n\n\
             _**User (2025-05-04 10:03:00 UTC)**_\nq2\n"
        );
    }

    #[test]
    fn test_headers_past_last_record_stay_unstamped() {
        let store = store_with("_**User**_\nq\n_**Agent**_\na\n_**User**_\n");
        store.insert(LEDGER, "2025-05-04T10:01:00Z|q\n2025-05-04T10:02:00Z|a\n");

        merge_transcript_at(&store, Path::new(TRANSCRIPT), at(3)).unwrap();
        assert_eq!(
            store.contents(TRANSCRIPT).unwrap(),
            "_**User (2025-05-04 10:01:00 UTC)**_\nq\n\
             _**Agent (2025-05-04 10:02:00 UTC)**_\na\n\
             _**User**_\n"
        );
    }

    #[test]
    fn test_clear_noise() {
        let store = store_with("_**Agent**_\nhi\n");
        store.insert(LEDGER, "2025-05-04T10:01:00Z|hi\n");
        assert!(clear_noise(&store, Path::new(TRANSCRIPT)).unwrap());
        assert_eq!(store.contents(LEDGER).unwrap(), "");

        let store = store_with("_**User**_\nhi\n");
        store.insert(LEDGER, "2025-05-04T10:01:00Z|hi\n");
        assert!(!clear_noise(&store, Path::new(TRANSCRIPT)).unwrap());
        assert_eq!(store.contents(LEDGER).unwrap(), "2025-05-04T10:01:00Z|hi\n");
    }

    #[test]
    fn test_merge_all_continues_past_failures() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::new(
            tmp.path().join(".specstory/history"),
            tmp.path().join(".specstory/timestamps"),
        );
        let store = FsStore::new(layout.clone());
        std::fs::create_dir_all(layout.history_dir()).unwrap();
        let good = layout.history_dir().join("good.md");
        let bad = layout.history_dir().join("bad.md");
        std::fs::write(&good, "_**User**_\nhello\n").unwrap();
        std::fs::write(&bad, "_**User**_\nhello\n").unwrap();
        // A directory where the ledger file should be makes that merge fail.
        std::fs::create_dir_all(layout.ledger_path(&bad)).unwrap();

        let report = merge_all(&store).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, bad);
        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.stamped_headers(), 1);
        assert!(std::fs::read_to_string(&good).unwrap().starts_with("_**User ("));
        assert_eq!(std::fs::read_to_string(&bad).unwrap(), "_**User**_\nhello\n");
    }
}
