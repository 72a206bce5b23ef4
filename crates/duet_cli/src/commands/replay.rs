//! Replay command - Project a recorded log onto one conversation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info};

use duet_core::{project, Identity, Message};

#[derive(Args)]
pub struct ReplayArgs {
    /// Recorded log, one JSON message per line in log order
    #[arg(short, long)]
    pub file: PathBuf,

    /// Local participant
    #[arg(short, long)]
    pub local: String,

    /// Conversation counterpart
    #[arg(short, long)]
    pub peer: String,

    /// Print messages as JSON lines
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: ReplayArgs) -> Result<()> {
    if args.local.trim().is_empty() || args.peer.trim().is_empty() {
        anyhow::bail!("Invalid argument: --local and --peer must not be empty");
    }
    if !args.file.exists() {
        anyhow::bail!("Log file not found: {}", args.file.display());
    }

    let snapshot = load_messages(&args.file)?;
    let local = Identity::from(args.local);
    let peer = Identity::from(args.peer);
    let conversation = project(&snapshot, &local, &peer);
    info!(
        "{} of {} messages belong to {} <-> {}",
        conversation.len(),
        snapshot.len(),
        local,
        peer
    );

    for message in &conversation {
        if args.json {
            println!("{}", serde_json::to_string(message)?);
        } else {
            println!("[{}] {}: {}", message.created_at, message.sender_id, message.text);
        }
    }

    Ok(())
}

/// Read a JSON-lines log. Blank lines are skipped.
fn load_messages(path: &Path) -> Result<Vec<Message>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut messages = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let message: Message = serde_json::from_str(line)
            .with_context(|| format!("Invalid message on line {}", index + 1))?;
        messages.push(message);
    }
    debug!("Loaded {} messages from {}", messages.len(), path.display());
    Ok(messages)
}
