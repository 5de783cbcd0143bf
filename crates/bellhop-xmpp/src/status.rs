// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

//! Connection status as a single ordered event stream.
//!
//! Downstream components (reconnection, logging) depend on observing every
//! transition, including transient ones, so transitions are fanned out to
//! each subscriber in order and never coalesced.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

/// Connection lifecycle state. Exactly one value holds at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
    /// A reconnection attempt is scheduled after this delay.
    ReconnectingIn(Duration),
    ReconnectFailed {
        attempt: u32,
    },
    /// The session was lost unexpectedly.
    ClosedOnError,
    /// Explicit shutdown; always the final transition delivered.
    Closed,
}

struct StatusInner {
    current: Status,
    observers: Vec<mpsc::UnboundedSender<Status>>,
}

/// Holds the current [`Status`] and fans out transitions to subscribers.
pub(crate) struct StatusCell {
    inner: Mutex<StatusInner>,
}

impl StatusCell {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(StatusInner {
                current: Status::Disconnected,
                observers: Vec::new(),
            }),
        }
    }

    pub(crate) fn current(&self) -> Status {
        self.lock().current.clone()
    }

    /// Register an observer. Every subsequent transition is delivered once,
    /// in the order it occurred.
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<Status> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().observers.push(tx);
        rx
    }

    /// Apply a transition and notify observers. `Closed` is terminal: once
    /// delivered, later transitions are ignored.
    pub(crate) fn transition(&self, next: Status) {
        let mut inner = self.lock();
        if inner.current == Status::Closed {
            return;
        }
        inner.current = next.clone();
        inner
            .observers
            .retain(|observer| observer.send(next.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatusInner> {
        // A poisoned lock only means a panicking thread mid-transition;
        // the state itself is a plain enum and stays usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
