//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// cxasm - inspect and validate Cloud Assemblies
#[derive(Parser, Debug)]
#[command(name = "cxasm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a Cloud Assembly directory or manifest file
    Validate {
        /// Assembly directory or path to its manifest.json
        #[arg(default_value = "cdk.out")]
        path: PathBuf,

        /// Highest manifest version accepted (defaults to the supported one)
        #[arg(long)]
        max_version: Option<String>,
    },

    /// List artifacts in deployment order
    Ls {
        /// Assembly directory or path to its manifest.json
        #[arg(default_value = "cdk.out")]
        path: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show library and manifest schema versions
    Version,

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Shell types for completion generation.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}
