// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "tunacode",
    about = "A terminal-based, tool-using coding assistant",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use, e.g. "mock:echo" or "anthropic:claude-opus-4-5".
    #[arg(long, short = 'M', env = "TUNACODE_MODEL", global = true)]
    pub model: Option<String>,

    /// Write a default config file (if missing) and print its path, then exit.
    #[arg(long)]
    pub setup: bool,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one request headlessly and exit.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// The task to send to the agent.
    pub prompt: String,

    /// Approve every tool call without asking (headless default otherwise
    /// rejects any tool that isn't read-only).
    #[arg(long)]
    pub auto_approve: bool,

    /// Emit the final response (and usage) as a single JSON object on stdout
    /// instead of plain text.
    #[arg(long)]
    pub output_json: bool,

    /// Abort the request after this many seconds (0 = no limit).
    #[arg(long, value_name = "SEC", default_value = "0")]
    pub timeout: u64,

    /// Working directory the tools operate against. Defaults to the current
    /// directory.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Model to use for this run; overrides the top-level `--model`.
    #[arg(long, short = 'M')]
    pub model: Option<String>,
}
