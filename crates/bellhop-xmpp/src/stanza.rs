// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

//! Stanza builders for the handful of protocol units this crate emits
//! itself: MUC join/leave presence, availability presence, XEP-0199 pings,
//! and IQ replies. Application payloads pass through opaque.

use std::str::FromStr;

use minidom::Element;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::jid::{BareJid, Jid};
use xmpp_parsers::ns;
use xmpp_parsers::presence::{Presence, Type as PresenceType};
use xmpp_parsers::stanza_error::{DefinedCondition, ErrorType, StanzaError};

fn occupant_jid(room: &BareJid, nickname: &str) -> Option<Jid> {
    Jid::from_str(&format!("{room}/{nickname}")).ok()
}

/// Presence announcing availability to the server, sent once after login.
pub fn available() -> Presence {
    Presence {
        from: None,
        to: None,
        id: None,
        type_: PresenceType::None,
        show: None,
        statuses: Default::default(),
        priority: 0i8,
        payloads: vec![],
    }
}

/// MUC create-or-join presence: available presence addressed to
/// `room/nickname` carrying an `x` element in the MUC namespace, with the
/// room password as a `password` child when the room requires one.
/// `None` when the occupant JID would be malformed.
pub fn muc_join(room: &BareJid, nickname: &str, password: Option<&str>) -> Option<Presence> {
    let to = occupant_jid(room, nickname)?;
    let mut muc = Element::builder("x", ns::MUC);
    if let Some(password) = password {
        muc = muc.append(Element::builder("password", ns::MUC).append(password).build());
    }
    let muc_elem = muc.build();

    Some(Presence {
        from: None,
        to: Some(to),
        id: None,
        type_: PresenceType::None,
        show: None,
        statuses: Default::default(),
        priority: 0i8,
        payloads: vec![muc_elem],
    })
}

/// MUC leave: unavailable presence addressed to `room/nickname`.
pub fn muc_leave(room: &BareJid, nickname: &str) -> Option<Presence> {
    let to = occupant_jid(room, nickname)?;

    Some(Presence {
        from: None,
        to: Some(to),
        id: None,
        type_: PresenceType::Unavailable,
        show: None,
        statuses: Default::default(),
        priority: 0i8,
        payloads: vec![],
    })
}

/// XEP-0199 ping IQ addressed to the server (no `to` attribute).
pub fn ping(id: &str) -> Element {
    Element::builder("iq", "jabber:client")
        .attr("type", "get")
        .attr("id", id)
        .append(Element::builder("ping", "urn:xmpp:ping").build())
        .build()
}

/// IQ result carrying an optional payload, addressed back to the requester.
pub fn iq_result(id: &str, to: Option<Jid>, payload: Option<Element>) -> Element {
    let iq = Iq {
        from: None,
        to,
        id: id.to_string(),
        payload: IqType::Result(payload),
    };
    iq.into()
}

/// IQ error reply.
pub fn iq_error(id: &str, to: Option<Jid>, error: StanzaError) -> Element {
    let iq = Iq {
        from: None,
        to,
        id: id.to_string(),
        payload: IqType::Error(error),
    };
    iq.into()
}

/// The error sent for a get/set IQ no handler claims.
pub fn service_unavailable() -> StanzaError {
    StanzaError::new(
        ErrorType::Cancel,
        DefinedCondition::ServiceUnavailable,
        "en",
        "no handler registered for this query",
    )
}
