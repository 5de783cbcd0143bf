// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

//! Production transport: `tokio-xmpp` over TCP with STARTTLS.
//!
//! The connector drives the client until it reports `Online` (connected and
//! authenticated), then hands the client to a driver task. The driver owns
//! the socket: it serializes outbound sends from an mpsc command channel,
//! forwards inbound stanzas, and issues XEP-0199 pings at the configured
//! interval. Automatic reconnection in `tokio-xmpp` stays off; recovery is
//! the job of this crate's reconnection policy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use minidom::Element;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_xmpp::starttls::ServerConfig;
use tokio_xmpp::{AsyncClient, AsyncConfig, Event as XmppEvent};
use tracing::{debug, warn};
use xmpp_parsers::jid::Jid;

use crate::config::SessionConfig;
use crate::error::{ConnectionError, SessionError};
use crate::session::{Connector, Session, SessionEvent};
use crate::stanza;

const DEFAULT_XMPP_PORT: u16 = 5222;

type Client = AsyncClient<ServerConfig>;

enum Command {
    Send(Element, oneshot::Sender<Result<(), SessionError>>),
    Close,
}

/// [`Connector`] producing TCP/STARTTLS sessions.
pub struct TcpConnector;

struct TcpSession {
    commands: mpsc::UnboundedSender<Command>,
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        config: &SessionConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Arc<dyn Session>, ConnectionError> {
        let jid = config.bare_jid()?;

        let server = match &config.host {
            Some(host) => ServerConfig::Manual {
                host: host.clone(),
                port: config.port.unwrap_or(DEFAULT_XMPP_PORT),
            },
            None => ServerConfig::UseSrv,
        };

        let client_config = AsyncConfig {
            jid: Jid::from(jid),
            password: config.password.clone(),
            server,
        };

        let mut client = Client::new_with_config(client_config);
        client.set_reconnect(false);

        timeout(config.connect_timeout(), wait_online(&mut client))
            .await
            .map_err(|_| ConnectionError::Timeout)??;
        debug!(domain = %config.domain, "transport online");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(client, command_rx, events, config.ping_interval()));

        Ok(Arc::new(TcpSession {
            commands: command_tx,
        }))
    }
}

#[async_trait]
impl Session for TcpSession {
    async fn send_stanza(&self, stanza: Element) -> Result<(), SessionError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(Command::Send(stanza, ack_tx))
            .map_err(|_| SessionError::Closed)?;
        ack_rx.await.map_err(|_| SessionError::Closed)?
    }

    async fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

/// Pump the client to completion of stream negotiation and SASL.
async fn wait_online(client: &mut Client) -> Result<(), ConnectionError> {
    loop {
        match client.next().await {
            Some(XmppEvent::Online { .. }) => return Ok(()),
            Some(XmppEvent::Disconnected(error)) => return Err(classify(&error.to_string())),
            Some(_) => continue,
            None => {
                return Err(ConnectionError::Stream(
                    "stream ended during negotiation".to_string(),
                ))
            }
        }
    }
}

/// Sort a transport failure message into the error taxonomy. `tokio-xmpp`
/// reports these as strings, so the split is textual.
fn classify(message: &str) -> ConnectionError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("auth") || lower.contains("sasl") || lower.contains("credential") {
        ConnectionError::Authentication(message.to_string())
    } else if lower.contains("dns")
        || lower.contains("resolve")
        || lower.contains("srv")
        || lower.contains("idna")
    {
        ConnectionError::Dns(message.to_string())
    } else if lower.contains("tls") || lower.contains("certificate") || lower.contains("handshake")
    {
        ConnectionError::Tls(message.to_string())
    } else if lower.contains("stream") || lower.contains("parse") || lower.contains("xml") {
        ConnectionError::Stream(message.to_string())
    } else {
        ConnectionError::Transport(message.to_string())
    }
}

async fn drive(
    mut client: Client,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
    ping_interval: Duration,
) {
    let first_ping = tokio::time::Instant::now() + ping_interval;
    let mut ping = tokio::time::interval_at(first_ping, ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut ping_seq: u64 = 0;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(stanza, ack)) => {
                    let result = client
                        .send_stanza(stanza)
                        .await
                        .map_err(|error| SessionError::Send(error.to_string()));
                    let _ = ack.send(result);
                }
                Some(Command::Close) | None => {
                    debug!("closing xmpp stream");
                    let _ = client.send_end().await;
                    return;
                }
            },
            event = client.next() => match event {
                Some(XmppEvent::Stanza(elem)) => {
                    let _ = events.send(SessionEvent::Stanza(elem));
                }
                Some(XmppEvent::Online { .. }) => {}
                Some(XmppEvent::Disconnected(error)) => {
                    warn!("transport disconnected: {error}");
                    let _ = events.send(SessionEvent::Disconnected(error.to_string()));
                    return;
                }
                None => {
                    let _ = events.send(SessionEvent::Disconnected("xmpp stream ended".to_string()));
                    return;
                }
            },
            _ = ping.tick() => {
                ping_seq += 1;
                let id = format!("bellhop-ping-{ping_seq}");
                if let Err(error) = client.send_stanza(stanza::ping(&id)).await {
                    debug!(%error, "liveness ping failed");
                }
            }
        }
    }
}
