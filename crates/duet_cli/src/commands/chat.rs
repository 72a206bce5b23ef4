//! Chat command - Interactive session against an in-memory log.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use duet_core::{
    AnonymousIdentityProvider, ChatEngine, DuetConfig, EngineHandle, Identity, MemoryLog, Message,
    ResponderProvider, ResponderService, ScriptedResponder, SendOutcome,
};
use duet_responder::{HttpResponder, SetupError};

#[derive(Args)]
pub struct ChatArgs {
    /// Identity to talk to (defaults to the automated responder)
    #[arg(short, long)]
    pub peer: Option<String>,

    /// Path to a duet.toml configuration file
    #[arg(short, long, env = "DUET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Answer with a local echo instead of a hosted model
    #[arg(long)]
    pub echo: bool,
}

/// What a line of input asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Peer(&'a str),
    Text(&'a str),
    Nothing,
}

fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    if trimmed == "/quit" {
        return Input::Quit;
    }
    if let Some(peer) = trimmed.strip_prefix("/peer ") {
        let peer = peer.trim();
        if !peer.is_empty() && !peer.contains(char::is_whitespace) {
            return Input::Peer(peer);
        }
    }
    if trimmed.is_empty() {
        Input::Nothing
    } else {
        Input::Text(line)
    }
}

pub async fn execute(args: ChatArgs) -> Result<()> {
    let config = DuetConfig::load(args.config.as_deref()).context("Invalid configuration")?;
    let responder = select_responder(&config, args.echo);

    let log = MemoryLog::new(config.namespace.clone());
    let engine = ChatEngine::new(
        config.clone(),
        Arc::new(log),
        responder,
        Arc::new(AnonymousIdentityProvider),
    )
    .start();

    let local = match engine.ready().await? {
        Some(identity) => identity,
        None => anyhow::bail!("Sign-in failed: {:?}", engine.session()),
    };
    let peer = args
        .peer
        .map(Identity::from)
        .unwrap_or_else(|| config.responder_identity());

    println!("Signed in as {}", local);
    println!("Talking to {} (/peer <id> to switch, /quit to leave)", peer);
    engine.select_peer(peer)?;

    let printer = spawn_printer(&engine, local.clone());
    let result = read_loop(&engine).await;

    engine.sign_out().await?;
    engine.shutdown().await;
    printer.abort();
    result
}

fn select_responder(config: &DuetConfig, echo: bool) -> Arc<dyn ResponderService> {
    if echo || config.provider == ResponderProvider::Echo {
        info!("Using echo responder");
        return Arc::new(ScriptedResponder::echo());
    }

    match HttpResponder::from_config(config).or_else(|_| HttpResponder::from_env()) {
        Ok(responder) => {
            info!(
                "Using {} responder with model {}",
                responder.provider().name(),
                responder.model()
            );
            Arc::new(responder)
        }
        Err(SetupError::NotConfigured) => {
            warn!("No responder API key configured, falling back to echo");
            Arc::new(ScriptedResponder::echo())
        }
        Err(e) => {
            warn!("Responder unavailable ({}), falling back to echo", e);
            Arc::new(ScriptedResponder::echo())
        }
    }
}

async fn read_loop(engine: &EngineHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            return Ok(());
        };

        match parse_input(&line) {
            Input::Quit => return Ok(()),
            Input::Nothing => {}
            Input::Peer(peer) => {
                engine.select_peer(peer)?;
                println!("Talking to {}", peer);
            }
            Input::Text(text) => match engine.send(text).await? {
                SendOutcome::Rejected(reason) => println!("(not sent: {:?})", reason),
                SendOutcome::AppendFailed(error) => println!("(send failed: {})", error),
                SendOutcome::ReplyAppendFailed { error, .. } => {
                    println!("(reply could not be stored: {})", error)
                }
                SendOutcome::Sent(_) | SendOutcome::Replied { .. } => {}
            },
        }
    }
}

/// Print conversation messages as they appear.
///
/// Switching peers prints the new conversation's history once.
fn spawn_printer(engine: &EngineHandle, local: Identity) -> JoinHandle<()> {
    let mut conversation = engine.watch_conversation();
    tokio::spawn(async move {
        let mut printed = HashSet::new();
        loop {
            let current = conversation.borrow_and_update().clone();
            for message in current.iter() {
                if printed.insert(message.id.clone()) {
                    println!("{}", render(message, &local));
                }
            }
            if conversation.changed().await.is_err() {
                break;
            }
        }
    })
}

fn render(message: &Message, local: &Identity) -> String {
    let who = if &message.sender_id == local {
        "you".to_string()
    } else {
        message.sender_id.to_string()
    };
    format!("[{}] {}: {}", message.created_at, who, message.text)
}
