// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

//! Connection parameters for a control-channel session.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use xmpp_parsers::jid::BareJid;

use crate::error::ConnectionError;

/// Default XEP-0199 ping interval, used as a server liveness probe.
const DEFAULT_PING_INTERVAL_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 60;

/// Immutable connection parameters for one XMPP session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Local part of the login JID.
    pub username: String,
    /// XMPP service domain to authenticate against.
    pub domain: String,
    /// Password for SASL authentication.
    #[serde(skip_serializing)]
    pub password: String,
    /// Server host, if different from the JID domain (SRV lookup otherwise).
    #[serde(default)]
    pub host: Option<String>,
    /// Port override (default 5222).
    #[serde(default)]
    pub port: Option<u16>,
    /// Interval between XEP-0199 pings, in seconds.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Ceiling on connect + authentication, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_ping_interval_secs() -> u64 {
    DEFAULT_PING_INTERVAL_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl SessionConfig {
    pub fn new(username: &str, domain: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            domain: domain.to_string(),
            password: password.to_string(),
            host: None,
            port: None,
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    /// The bare login JID derived from `username` and `domain`.
    pub fn bare_jid(&self) -> Result<BareJid, ConnectionError> {
        let jid = format!("{}@{}", self.username, self.domain);
        BareJid::from_str(&jid)
            .map_err(|error| ConnectionError::InvalidConfig(format!("invalid JID '{jid}': {error}")))
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

/// Reconnection backoff parameters.
///
/// The schedule is jittered exponential: `base_delay` doubled per attempt,
/// capped at `max_delay`, with ±25% jitter applied to each delay.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retry budget; `None` retries indefinitely.
    pub max_attempts: Option<u32>,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_interval_defaults_to_thirty_seconds() {
        let config = SessionConfig::new("agent", "chat.example.com", "secret");
        assert_eq!(config.ping_interval(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn bare_jid_combines_username_and_domain() {
        let config = SessionConfig::new("agent-7", "chat.example.com", "secret");
        assert_eq!(
            config.bare_jid().unwrap().to_string(),
            "agent-7@chat.example.com"
        );
    }

    #[test]
    fn bare_jid_rejects_malformed_parts() {
        let config = SessionConfig::new("", "chat.example.com", "secret");
        assert!(matches!(
            config.bare_jid(),
            Err(ConnectionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn deserializes_from_toml_with_defaults() {
        let config: SessionConfig = toml::from_str(
            r#"
            username = "agent"
            domain = "chat.example.com"
            password = "secret"
            host = "xmpp.internal"
            "#,
        )
        .unwrap();
        assert_eq!(config.host.as_deref(), Some("xmpp.internal"));
        assert_eq!(config.ping_interval_secs, 30);
        assert!(config.port.is_none());
    }
}
