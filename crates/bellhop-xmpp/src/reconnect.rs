// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

//! Automatic recovery of an unexpectedly lost session.
//!
//! The policy is a single task watching the manager's status stream, so at
//! most one reconnection attempt is ever in flight. After a successful
//! re-authentication it replays room memberships; IQ handlers need no replay
//! because they are registered against the manager, not the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::RetryConfig;
use crate::connection::ConnectionManager;
use crate::rooms::RoomMembershipRegistry;
use crate::status::Status;

/// Per-attempt delay computation: exponential from `base`, capped at `max`,
/// with ±25% jitter so a fleet of agents does not thunder back in lockstep.
#[derive(Debug)]
pub(crate) struct Backoff {
    attempt: u32,
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub(crate) fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            base: config.base_delay,
            max: config.max_delay,
        }
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        self.attempt += 1;
        let exponent = (self.attempt - 1).min(16);
        let uncapped = self.base.as_secs_f64() * (2.0f64).powi(exponent as i32);
        let capped = uncapped.min(self.max.as_secs_f64());
        let jittered = capped * (1.0 + (jitter() * 0.5 - 0.25));
        Duration::from_secs_f64(jittered.max(self.base.as_secs_f64() * 0.5))
    }
}

/// Jitter in [0, 1) from the subsecond clock; uniformity is not needed here.
fn jitter() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos as f64 % 1000.0) / 1000.0
}

/// Watches for `ClosedOnError` and drives reconnection attempts until the
/// session is back, the retry budget runs out, or the manager shuts down.
pub struct ReconnectionPolicy {
    _task: JoinHandle<()>,
}

impl ReconnectionPolicy {
    pub fn spawn(
        manager: Arc<ConnectionManager>,
        rooms: Arc<RoomMembershipRegistry>,
        retry: RetryConfig,
    ) -> Self {
        let task = tokio::spawn(run(manager, rooms, retry));
        Self { _task: task }
    }
}

async fn run(
    manager: Arc<ConnectionManager>,
    rooms: Arc<RoomMembershipRegistry>,
    retry: RetryConfig,
) {
    let mut status_rx = manager.subscribe_status();
    let token = manager.cancellation();

    loop {
        let status = tokio::select! {
            _ = token.cancelled() => return,
            status = status_rx.recv() => match status {
                Some(status) => status,
                None => return,
            },
        };
        // The policy's own emissions come back on this stream; only an
        // unexpected drop starts a recovery round.
        if status != Status::ClosedOnError {
            continue;
        }

        let mut backoff = Backoff::new(&retry);
        loop {
            let delay = backoff.next_delay();
            let attempt = backoff.attempt();
            manager.emit_status(Status::ReconnectingIn(delay));
            info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");

            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            match manager.reconnect().await {
                Ok(()) => {
                    let report = rooms.replay_all().await;
                    for (room, error) in &report.failures {
                        warn!(%room, %error, "room rejoin failed during replay");
                    }
                    info!(
                        attempt,
                        rejoined = report.attempted - report.failures.len(),
                        "session recovered"
                    );
                    break;
                }
                Err(error) => {
                    manager.emit_status(Status::ReconnectFailed { attempt });
                    if !error.is_retryable() {
                        warn!(%error, attempt, "reconnect failed terminally");
                        return;
                    }
                    if retry.max_attempts.is_some_and(|max| attempt >= max) {
                        warn!(attempt, "reconnect retry budget exhausted");
                        return;
                    }
                    warn!(%error, attempt, "reconnect attempt failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let retry = RetryConfig::default();
        let mut backoff = Backoff::new(&retry);

        let first = backoff.next_delay();
        assert_eq!(backoff.attempt(), 1);
        assert!(first.as_secs_f64() >= 0.5);
        assert!(first.as_secs_f64() <= 1.25);

        let second = backoff.next_delay();
        assert!(second.as_secs_f64() >= 1.5);
        assert!(second.as_secs_f64() <= 2.5);

        for _ in 0..20 {
            backoff.next_delay();
        }
        let capped = backoff.next_delay();
        // 30s cap plus 25% jitter headroom
        assert!(capped.as_secs_f64() <= 37.5);
    }

    #[test]
    fn backoff_respects_configured_base() {
        let retry = RetryConfig {
            max_attempts: None,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        };
        let mut backoff = Backoff::new(&retry);
        let first = backoff.next_delay();
        assert!(first <= Duration::from_millis(13));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert!(backoff.next_delay() <= Duration::from_millis(50));
    }
}
