pub mod merge;
pub mod observe;
pub mod wrap;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum InternalCommands {
    /// Run the background observer (spawned by the wrapper)
    Observe(observe::ObserveArgs),
    /// Merge recorded timestamps into transcript headers
    Merge(merge::MergeArgs),
}
