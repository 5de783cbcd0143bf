// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

//! Capability-scoped IQ request handling.
//!
//! Handlers are registered against the
//! [`ConnectionManager`](crate::ConnectionManager) rather than the ephemeral
//! session, so a registration automatically applies to every session the
//! manager establishes. Matching an inbound query to its handler is by the
//! payload's element name and namespace, the same key the underlying
//! protocol uses.

use async_trait::async_trait;
use minidom::Element;
use xmpp_parsers::jid::Jid;
use xmpp_parsers::stanza_error::StanzaError;

use crate::error::RegisterError;

/// Which inbound queries a handler claims: the payload element name plus its
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IqCapability {
    element: String,
    namespace: String,
}

impl IqCapability {
    /// Fails fast on malformed keys; an empty or whitespace-only part can
    /// never match a real payload.
    pub fn new(element: &str, namespace: &str) -> Result<Self, RegisterError> {
        if element.trim().is_empty() || namespace.trim().is_empty() {
            return Err(RegisterError::InvalidCapability);
        }
        Ok(Self {
            element: element.to_string(),
            namespace: namespace.to_string(),
        })
    }

    pub fn element(&self) -> &str {
        &self.element
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqRequestKind {
    Get,
    Set,
}

/// An inbound query routed to a handler.
#[derive(Debug, Clone)]
pub struct IqRequest {
    pub from: Option<Jid>,
    pub id: String,
    pub kind: IqRequestKind,
    /// The query payload, opaque to this crate.
    pub payload: Element,
}

/// A handler's answer; the dispatcher builds and sends the reply IQ with the
/// request's id and addressing.
#[derive(Debug)]
pub enum IqReply {
    Result(Option<Element>),
    Error(StanzaError),
}

/// A registered responder for one class of inbound query.
#[async_trait]
pub trait IqHandler: Send + Sync {
    async fn handle(&self, request: IqRequest) -> IqReply;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_requires_both_parts() {
        assert!(IqCapability::new("jibri", "urn:example:control:1").is_ok());
        assert!(matches!(
            IqCapability::new("", "urn:example:control:1"),
            Err(RegisterError::InvalidCapability)
        ));
        assert!(matches!(
            IqCapability::new("jibri", "   "),
            Err(RegisterError::InvalidCapability)
        ));
    }

    #[test]
    fn capabilities_key_by_element_and_namespace() {
        let a = IqCapability::new("query", "urn:a").unwrap();
        let b = IqCapability::new("query", "urn:b").unwrap();
        let a2 = IqCapability::new("query", "urn:a").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, a2);
    }
}
