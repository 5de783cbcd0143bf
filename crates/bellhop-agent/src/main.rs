// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

//! Long-running control-channel agent.
//!
//! Reads a TOML config, authenticates against the XMPP service, joins the
//! configured MUC rooms, and then idles under the reconnection policy until
//! interrupted. Inbound IQ handling is left to the embedding deployment;
//! this binary only keeps the channel alive.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use xmpp_parsers::jid::BareJid;

use bellhop_xmpp::{
    stanza, ConnectionManager, ReconnectionPolicy, RetryConfig, RoomMembershipRegistry,
    SessionConfig, StanzaSender, Status, TcpConnector,
};

#[derive(Parser)]
#[command(name = "bellhop-agent", version, about = "Resilient XMPP control-channel agent")]
struct Cli {
    /// Path to the agent configuration file.
    #[arg(short, long, default_value = "bellhop.toml")]
    config: PathBuf,
}

#[derive(Deserialize)]
struct AgentConfig {
    connection: SessionConfig,
    #[serde(default)]
    retry: RetrySection,
    #[serde(default)]
    rooms: Vec<RoomSection>,
}

#[derive(Deserialize)]
#[serde(default)]
struct RetrySection {
    /// Retry budget per outage; unset retries indefinitely.
    max_attempts: Option<u32>,
    base_delay_secs: u64,
    max_delay_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay_secs: 1,
            max_delay_secs: 30,
        }
    }
}

impl From<RetrySection> for RetryConfig {
    fn from(section: RetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts,
            base_delay: Duration::from_secs(section.base_delay_secs.max(1)),
            max_delay: Duration::from_secs(section.max_delay_secs.max(1)),
        }
    }
}

#[derive(Deserialize)]
struct RoomSection {
    jid: String,
    nickname: String,
    /// Password for members-only rooms.
    #[serde(default)]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let raw = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("reading config file {}", cli.config.display()))?;
    let config: AgentConfig =
        toml::from_str(&raw).with_context(|| format!("parsing {}", cli.config.display()))?;

    let manager = ConnectionManager::new(config.connection, Arc::new(TcpConnector));
    spawn_status_logger(manager.subscribe_status());

    manager.connect().await.context("initial connection failed")?;

    let sender = StanzaSender::new(Arc::clone(&manager));
    if !sender.send(stanza::available().into()).await {
        warn!("initial availability presence was not accepted");
    }

    let rooms = RoomMembershipRegistry::new(Arc::clone(&manager));
    for room in &config.rooms {
        let jid = BareJid::from_str(&room.jid)
            .with_context(|| format!("invalid room address '{}'", room.jid))?;
        rooms
            .join_or_create(jid, &room.nickname, room.password.as_deref(), None)
            .await
            .with_context(|| format!("joining room {}", room.jid))?;
    }

    let _policy =
        ReconnectionPolicy::spawn(Arc::clone(&manager), Arc::clone(&rooms), config.retry.into());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for interrupt")?;
    info!("interrupt received, shutting down");
    manager.shutdown().await;
    Ok(())
}

fn spawn_status_logger(mut status_rx: mpsc::UnboundedReceiver<Status>) {
    tokio::spawn(async move {
        while let Some(status) = status_rx.recv().await {
            match status {
                Status::ReconnectingIn(delay) => {
                    info!(delay_ms = delay.as_millis() as u64, "reconnect scheduled")
                }
                Status::ReconnectFailed { attempt } => warn!(attempt, "reconnect attempt failed"),
                Status::ClosedOnError => warn!("session lost"),
                other => info!(status = ?other, "connection status"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_agent_config() {
        let config: AgentConfig = toml::from_str(
            r#"
            [connection]
            username = "agent-1"
            domain = "chat.example.com"
            password = "secret"

            [retry]
            max_attempts = 10
            base_delay_secs = 2
            max_delay_secs = 60

            [[rooms]]
            jid = "ops@conference.chat.example.com"
            nickname = "agent-1"

            [[rooms]]
            jid = "alerts@conference.chat.example.com"
            nickname = "agent-1"
            password = "hunter2"
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.username, "agent-1");
        assert_eq!(config.rooms.len(), 2);
        assert!(config.rooms[0].password.is_none());
        assert_eq!(config.rooms[1].password.as_deref(), Some("hunter2"));
        let retry: RetryConfig = config.retry.into();
        assert_eq!(retry.max_attempts, Some(10));
        assert_eq!(retry.base_delay, Duration::from_secs(2));
    }

    #[test]
    fn retry_section_defaults_to_unbounded() {
        let config: AgentConfig = toml::from_str(
            r#"
            [connection]
            username = "agent-1"
            domain = "chat.example.com"
            password = "secret"
            "#,
        )
        .unwrap();

        let retry: RetryConfig = config.retry.into();
        assert_eq!(retry.max_attempts, None);
        assert_eq!(retry.base_delay, Duration::from_secs(1));
        assert!(config.rooms.is_empty());
    }
}
