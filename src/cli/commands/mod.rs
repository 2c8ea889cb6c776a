//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! Each handler opens what it needs through the library, formats the
//! result and prints it. Handlers never write to an assembly.

mod completion;
mod ls;
mod validate;
mod version;

// Re-export command functions for testing and direct invocation
pub use completion::completion;
pub use ls::{ls, Listing};
pub use validate::validate;
pub use version::version;

use crate::cli::args::Command;
use anyhow::Result;

/// Settings shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Minimal output
    pub quiet: bool,
}

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Validate { path, max_version } => {
            validate::validate(ctx, &path, max_version.as_deref())
        }
        Command::Ls { path, json } => ls::ls(ctx, &path, json),
        Command::Version => version::version(ctx),
        Command::Completion { shell } => completion::completion(shell),
    }
}
