use std::ffi::OsString;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use turnstamp_capture::INTERNAL_COMMAND;

mod commands;
mod output;

/// Log filter for the wrapper. Its own argv belongs to the recording tool,
/// so verbosity is only configurable through the environment.
const LOG_ENV: &str = "TURNSTAMP_LOG";

/// Internal entry points, reached as `turnstamp __turnstamp <command>`.
#[derive(Parser)]
#[command(
    name = "turnstamp __turnstamp",
    version,
    about = "Internal commands of the turnstamp recording wrapper"
)]
struct InternalCli {
    #[command(subcommand)]
    command: commands::InternalCommands,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    if args.first().is_some_and(|first| first == INTERNAL_COMMAND) {
        // The routing keyword stands in for the program name.
        let cli = InternalCli::parse_from(&args);
        return match &cli.command {
            commands::InternalCommands::Observe(args) => commands::observe::run(args),
            commands::InternalCommands::Merge(args) => commands::merge::run(args),
        };
    }

    let code = commands::wrap::run(&args)?;
    std::process::exit(code);
}
