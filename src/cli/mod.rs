//! cli
//!
//! Command-line interface for inspecting Cloud Assemblies.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the log subscriber
//! - Delegate to command handlers
//!
//! The library never installs a subscriber; this layer does, once.

pub mod args;
pub mod commands;

pub use args::{Cli, Command, Shell};

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.debug);

    let ctx = commands::Context { quiet: cli.quiet };
    commands::dispatch(cli.command, &ctx)
}

/// `RUST_LOG` wins; otherwise `--debug` enables this crate's debug output.
fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("warn,cxsynth=debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
