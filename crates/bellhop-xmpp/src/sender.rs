// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

use std::sync::Arc;

use minidom::Element;

use crate::connection::ConnectionManager;

/// Fire-and-forget outbound stanza handle.
///
/// `send` is advisory: true iff the active session accepted the stanza for
/// transmission, false on any failure including "no active session". Callers
/// must check the boolean; nothing is raised for expected failure modes.
#[derive(Clone)]
pub struct StanzaSender {
    manager: Arc<ConnectionManager>,
}

impl StanzaSender {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    pub async fn send(&self, stanza: Element) -> bool {
        self.manager.send(stanza).await
    }
}
