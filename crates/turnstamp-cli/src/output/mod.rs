use std::fmt::Display;
use std::path::Path;

use turnstamp_core::merge::MergeOutcome;

const CYAN: &str = "\x1b[96m";
const GREEN: &str = "\x1b[92m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

const BANNER_WIDTH: usize = 50;

/// Notice shown once when an interactive recording starts.
pub fn print_banner() {
    let rule = "─".repeat(BANNER_WIDTH);
    let title = "Timestamped recording active";
    let detail = "Turns will be stamped in .specstory/history";
    println!("{CYAN}╭{rule}╮{RESET}");
    println!(
        "{CYAN}│{RESET} {GREEN}{BOLD}{title:<width$}{RESET}{CYAN}│{RESET}",
        width = BANNER_WIDTH - 1
    );
    println!(
        "{CYAN}│{RESET} {detail:<width$}{CYAN}│{RESET}",
        width = BANNER_WIDTH - 1
    );
    println!("{CYAN}╰{rule}╯{RESET}");
    println!();
}

pub fn print_merge_outcome(path: &Path, outcome: &MergeOutcome) {
    match outcome {
        MergeOutcome::NoUserContent => {
            println!("{}: no user turns, ledger cleared", path.display());
        }
        MergeOutcome::Stamped {
            headers,
            backfilled,
            rewritten,
        } => {
            let state = if *rewritten { "updated" } else { "unchanged" };
            println!(
                "{}: {headers} headers stamped, {backfilled} backfilled ({state})",
                path.display()
            );
        }
    }
}

pub fn print_merge_failure(path: &Path, error: &impl Display) {
    eprintln!("turnstamp: could not timestamp {}: {error}", path.display());
}
