pub mod discover;
pub mod error;
pub mod handoff;
pub mod observer;
pub mod session;
pub mod supervisor;
mod sys;

/// First argument that routes the binary to its internal subcommands
/// instead of forwarding everything to the recording tool.
pub const INTERNAL_COMMAND: &str = "__turnstamp";
