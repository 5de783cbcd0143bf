// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

use thiserror::Error;
use xmpp_parsers::jid::BareJid;

/// Failure to establish (or re-establish) an authenticated session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("TLS handshake failed: {0}")]
    Tls(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("connection timeout")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("connection manager is shut down")]
    ShutDown,
}

impl ConnectionError {
    /// Whether a reconnection attempt that failed this way is worth retrying.
    /// Credential rejections and configuration errors are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ConnectionError::Authentication(_)
                | ConnectionError::InvalidConfig(_)
                | ConnectionError::ShutDown
        )
    }
}

/// Failure inside a live session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,

    #[error("stanza send failed: {0}")]
    Send(String),
}

/// Per-room failure from a join, leave, or replay operation.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("no authenticated session")]
    NotConnected,

    #[error("invalid occupant JID for room {room} (bad nickname?)")]
    InvalidOccupant { room: BareJid },

    #[error("join presence for room {room} was not accepted")]
    Rejected { room: BareJid },
}

/// Programming misuse caught at IQ handler registration time.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("invalid IQ capability: element and namespace must be non-empty")]
    InvalidCapability,
}
