//! CLI command definitions.
//!
//! Each subcommand maps to one way of driving the engine.

use clap::{Parser, Subcommand};

pub mod chat;
pub mod replay;

/// duet - two-party chat over a shared message log
#[derive(Parser)]
#[command(name = "duet")]
#[command(version, about = "duet - two-party chat over a shared message log")]
#[command(long_about = r#"
duet keeps a live copy of a shared, server-ordered message log, shows the
conversation between you and one peer, and has an automated responder
answer every message addressed to it.

COMMANDS:
  chat    → Interactive session against an in-memory log
  replay  → Project a recorded log (JSON lines) onto one conversation

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session
    Chat(chat::ChatArgs),

    /// Print one conversation from a recorded log
    Replay(replay::ReplayArgs),
}
