// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

//! The transport seam.
//!
//! [`ConnectionManager`](crate::ConnectionManager) talks to the wire through
//! these traits only. The production implementation lives in
//! [`transport`](crate::transport); tests substitute in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use minidom::Element;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::error::{ConnectionError, SessionError};

/// Events a live session pushes to its owner. Delivery happens on
/// transport-managed tasks, outside the manager's control.
#[derive(Debug)]
pub enum SessionEvent {
    /// An inbound stanza, undecoded beyond XML parsing.
    Stanza(Element),
    /// The transport dropped; the payload is a human-readable reason.
    Disconnected(String),
}

/// A live, authenticated transport connection.
///
/// `send_stanza` enqueues against the transport driver and returns promptly;
/// it never blocks on network I/O beyond handing the stanza off.
#[async_trait]
pub trait Session: Send + Sync {
    async fn send_stanza(&self, stanza: Element) -> Result<(), SessionError>;

    /// Release the connection. Idempotent.
    async fn close(&self);
}

/// Establishes sessions. `connect` blocks until authentication completes or
/// fails; it is the one long-wait operation in this crate.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &SessionConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Arc<dyn Session>, ConnectionError>;
}
