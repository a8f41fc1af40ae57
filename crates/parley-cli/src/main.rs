//! # parley
//!
//! Terminal chat client: joins one room, prints its timeline and connection
//! changes, and sends each line read from stdin.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parley_core::{AuthToken, ChatEventKind, RoomId, UserId};
use parley_session::{ChatClient, Origin, SendOutcome, StateTransition, TimelineEntry};
use parley_settings::ParleySettings;
use parley_transport::WebSocketConnector;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::debug;

/// Parley terminal client.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Chat in a Parley room from the terminal")]
struct Cli {
    /// Room to join.
    #[arg(long)]
    room: String,

    /// Your user ID.
    #[arg(long)]
    user: String,

    /// Chat endpoint (overrides settings).
    #[arg(long)]
    endpoint: Option<String>,

    /// Bearer token.
    #[arg(long, env = "PARLEY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Settings file (defaults to `~/.parley/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level (overrides settings; `RUST_LOG` wins over both).
    #[arg(long)]
    log_level: Option<String>,
}

fn load(args: &Cli) -> Result<ParleySettings> {
    let mut settings = match &args.settings {
        Some(path) => parley_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => parley_settings::load_settings().context("Failed to load settings")?,
    };
    if let Some(endpoint) = &args.endpoint {
        settings.connection.endpoint.clone_from(endpoint);
        parley_settings::validate(&settings).context("Invalid --endpoint")?;
    }
    Ok(settings)
}

/// One timeline entry as a terminal line.
fn render(entry: &TimelineEntry, me: &UserId) -> String {
    let event = &entry.event;
    let time = event
        .server_timestamp
        .map(|ts| format!("{} ", ts.format("%H:%M")))
        .unwrap_or_default();
    match event.kind {
        ChatEventKind::Join => format!("{time}* {} joined", event.sender_id),
        ChatEventKind::Leave => format!("{time}* {} left", event.sender_id),
        ChatEventKind::Chat => {
            let who = if entry.origin == Origin::Local || &event.sender_id == me {
                "me".to_string()
            } else {
                event.sender_id.to_string()
            };
            format!("{time}[{who}] {}", event.body)
        }
    }
}

fn render_transition(t: &StateTransition) -> String {
    match &t.cause {
        Some(cause) => format!("-- {} ({cause})", t.to),
        None => format!("-- {}", t.to),
    }
}

async fn print_transitions(mut rx: broadcast::Receiver<StateTransition>) {
    loop {
        match rx.recv().await {
            Ok(t) => eprintln!("{}", render_transition(&t)),
            Err(broadcast::error::RecvError::Lagged(n)) => debug!(skipped = n, "state printer lagged"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = load(&args)?;

    let level = args.log_level.as_deref().unwrap_or(settings.logging.level.as_str());
    if settings.logging.json {
        parley_core::logging::init_json_subscriber(level);
    } else {
        parley_core::logging::init_subscriber(level);
    }

    let me = UserId::from(args.user.as_str());
    let room = RoomId::from(args.room.as_str());
    let connector = Arc::new(WebSocketConnector::from_settings(&settings.connection));
    let client = ChatClient::new(
        &settings,
        connector,
        me.clone(),
        args.token.map(AuthToken::new),
    );
    drop(tokio::spawn(print_transitions(client.state_transitions())));

    let mut session = client
        .open_room_session(room.clone())
        .await
        .with_context(|| format!("Could not join room {room}"))?;
    eprintln!("joined {room} as {me}; type a message and press enter, /quit to leave");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            entry = session.recv() => match entry {
                Some(entry) => println!("{}", render(&entry, &me)),
                None => {
                    eprintln!("-- room closed");
                    break;
                }
            },
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else { break };
                let line = line.trim();
                if line == "/quit" {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                if session.send(line).await == SendOutcome::NotConnected {
                    eprintln!("!! offline, message not sent");
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for ctrl-c")?;
                break;
            }
        }
    }

    client.close(session).await;
    client.disconnect().await;
    Ok(())
}
