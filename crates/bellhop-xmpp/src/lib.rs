// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

//! Resilient XMPP control-channel client.
//!
//! Bellhop keeps a long-lived authenticated session with an XMPP service and
//! recovers it transparently when the transport drops. On top of the session
//! it tracks MUC room memberships (replayed after every reconnect), routes
//! inbound IQ queries to registered handlers, and sends opaque outbound
//! stanzas with an advisory boolean outcome.
//!
//! The pieces compose as follows: a [`ConnectionManager`] owns the single
//! live session and publishes every [`Status`] transition to subscribers; a
//! [`ReconnectionPolicy`] watches that stream and drives recovery with
//! jittered exponential backoff; a [`RoomMembershipRegistry`] holds joined
//! rooms and rejoins them after re-authentication; IQ handlers are registered
//! against the manager, not the session, so they survive reconnects by
//! construction.
//!
//! The wire protocol itself (framing, SASL, stanza serialization) is
//! delegated to `tokio-xmpp` behind the [`Connector`]/[`Session`] seam, which
//! also makes the whole lifecycle testable without a server.

pub mod config;
pub mod connection;
pub mod error;
pub mod iq;
pub mod reconnect;
pub mod rooms;
pub mod sender;
pub mod session;
pub mod stanza;
pub mod status;
pub mod transport;

pub use config::{RetryConfig, SessionConfig};
pub use connection::ConnectionManager;
pub use error::{ConnectionError, JoinError, RegisterError, SessionError};
pub use iq::{IqCapability, IqHandler, IqReply, IqRequest, IqRequestKind};
pub use reconnect::ReconnectionPolicy;
pub use rooms::{PresenceInterceptor, ReplayReport, RoomMembershipRegistry};
pub use sender::StanzaSender;
pub use session::{Connector, Session, SessionEvent};
pub use status::Status;
pub use transport::TcpConnector;
