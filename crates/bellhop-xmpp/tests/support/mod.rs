// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

//! In-memory transport doubles for lifecycle tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use minidom::Element;
use tokio::sync::mpsc;

use bellhop_xmpp::{
    ConnectionError, Connector, RetryConfig, Session, SessionConfig, SessionError, SessionEvent,
    Status,
};

/// A session that records what it was asked to send and lets tests inject
/// inbound events, including a synthetic disconnect.
pub struct FakeSession {
    sent: Mutex<Vec<Element>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    fail_to_prefix: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl FakeSession {
    pub fn sent(&self) -> Vec<Element> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulate the transport dropping out from under the manager.
    pub fn drop_connection(&self, reason: &str) {
        let _ = self
            .events
            .send(SessionEvent::Disconnected(reason.to_string()));
    }

    /// Deliver an inbound stanza as if it arrived from the server.
    pub fn inject_stanza(&self, elem: Element) {
        let _ = self.events.send(SessionEvent::Stanza(elem));
    }

    /// Reject every send whose `to` attribute starts with `prefix`.
    pub fn fail_sends_to(&self, prefix: &str) {
        *self.fail_to_prefix.lock().unwrap() = Some(prefix.to_string());
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn send_stanza(&self, stanza: Element) -> Result<(), SessionError> {
        if let Some(prefix) = self.fail_to_prefix.lock().unwrap().as_deref() {
            if stanza.attr("to").is_some_and(|to| to.starts_with(prefix)) {
                return Err(SessionError::Send(format!(
                    "synthetic rejection of stanza to {prefix}*"
                )));
            }
        }
        self.sent.lock().unwrap().push(stanza);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Produces [`FakeSession`]s; can be told to fail the next N connect
/// attempts or to poison sends on sessions it creates.
#[derive(Default)]
pub struct FakeConnector {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    fail_next: AtomicU32,
    fail_fatally: AtomicBool,
    connects: AtomicU32,
    fail_to_prefix: Mutex<Option<String>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_connects(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Make the next N connect failures non-retryable (bad credentials).
    pub fn fail_next_connects_fatally(&self, n: u32) {
        self.fail_fatally.store(true, Ordering::SeqCst);
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn fail_new_session_sends_to(&self, prefix: &str) {
        *self.fail_to_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn session(&self, index: usize) -> Arc<FakeSession> {
        Arc::clone(&self.sessions.lock().unwrap()[index])
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _config: &SessionConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Arc<dyn Session>, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            if self.fail_fatally.load(Ordering::SeqCst) {
                return Err(ConnectionError::Authentication(
                    "synthetic credential rejection".to_string(),
                ));
            }
            return Err(ConnectionError::Transport(
                "synthetic connect failure".to_string(),
            ));
        }

        let session = Arc::new(FakeSession {
            sent: Mutex::new(Vec::new()),
            events,
            fail_to_prefix: Mutex::new(self.fail_to_prefix.lock().unwrap().clone()),
            closed: AtomicBool::new(false),
        });
        self.sessions.lock().unwrap().push(Arc::clone(&session));
        Ok(session)
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig::new("agent-1", "chat.example.com", "secret")
}

/// Millisecond-scale backoff so reconnection tests run fast.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: Some(5),
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    }
}

/// Next status transition, or panic after two seconds.
pub async fn next_status(rx: &mut mpsc::UnboundedReceiver<Status>) -> Status {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for status transition")
        .expect("status stream closed")
}

/// Drain transitions until `stop` matches, returning everything observed
/// including the match. Panics if it never arrives.
pub async fn statuses_until(
    rx: &mut mpsc::UnboundedReceiver<Status>,
    stop: impl Fn(&Status) -> bool,
) -> Vec<Status> {
    let mut seen = Vec::new();
    loop {
        let status = next_status(rx).await;
        let done = stop(&status);
        seen.push(status);
        if done {
            return seen;
        }
    }
}

/// Poll `predicate` until it holds, or panic after two seconds.
pub async fn wait_until(predicate: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !predicate() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within deadline");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
