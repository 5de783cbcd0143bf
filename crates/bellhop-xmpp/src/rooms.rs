// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

//! MUC room membership tracking.
//!
//! The registry owns the set of currently joined rooms in join order. All
//! membership mutation (join, leave, replay) is serialized through one async
//! mutex, so a replay in flight blocks new join requests instead of
//! interleaving writes to the membership list.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use xmpp_parsers::jid::BareJid;
use xmpp_parsers::presence::Presence;

use crate::connection::ConnectionManager;
use crate::error::JoinError;
use crate::stanza;
use crate::status::Status;

/// Rewrites outbound presence for one room before transmission, e.g. to
/// attach a status extension the room's consumers understand.
pub trait PresenceInterceptor: Send + Sync {
    fn intercept(&self, presence: Presence) -> Presence;
}

struct Membership {
    room: BareJid,
    nickname: String,
    password: Option<String>,
    interceptor: Option<Arc<dyn PresenceInterceptor>>,
}

/// Outcome of a [`RoomMembershipRegistry::replay_all`] pass. Partial failure
/// is reported per room rather than aborting the replay.
#[derive(Default)]
pub struct ReplayReport {
    pub attempted: usize,
    pub failures: Vec<(BareJid, JoinError)>,
}

impl ReplayReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct RoomMembershipRegistry {
    manager: Arc<ConnectionManager>,
    memberships: Mutex<Vec<Membership>>,
}

impl RoomMembershipRegistry {
    pub fn new(manager: Arc<ConnectionManager>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            memberships: Mutex::new(Vec::new()),
        })
    }

    /// Create or join `room` under `nickname`, presenting `password` if the
    /// room requires one. A membership already held for the address is left
    /// first; leave-then-join, never two concurrent joins for the same
    /// address.
    pub async fn join_or_create(
        &self,
        room: BareJid,
        nickname: &str,
        password: Option<&str>,
        interceptor: Option<Arc<dyn PresenceInterceptor>>,
    ) -> Result<(), JoinError> {
        let mut memberships = self.memberships.lock().await;

        if let Some(position) = memberships.iter().position(|m| m.room == room) {
            let prior = memberships.remove(position);
            debug!(room = %prior.room, "leaving prior membership before rejoin");
            self.send_leave(&prior).await;
        }

        let membership = Membership {
            room,
            nickname: nickname.to_string(),
            password: password.map(str::to_string),
            interceptor,
        };
        self.send_join(&membership).await?;
        info!(room = %membership.room, nickname, "joined room");
        memberships.push(membership);
        Ok(())
    }

    /// Leave `room` if currently joined; no-op otherwise. Returns whether a
    /// membership existed and its leave presence was accepted.
    pub async fn leave(&self, room: &BareJid) -> bool {
        let mut memberships = self.memberships.lock().await;
        let Some(position) = memberships.iter().position(|m| &m.room == room) else {
            debug!(%room, "leave requested for room not joined");
            return false;
        };
        let membership = memberships.remove(position);
        let delivered = self.send_leave(&membership).await;
        info!(%room, delivered, "left room");
        delivered
    }

    /// Re-issue every tracked join in original join order, with the same
    /// nickname, password, and interceptor. Invoked after re-authentication.
    /// One room failing does not stop the others.
    pub async fn replay_all(&self) -> ReplayReport {
        let memberships = self.memberships.lock().await;
        let mut report = ReplayReport {
            attempted: memberships.len(),
            failures: Vec::new(),
        };
        for membership in memberships.iter() {
            if let Err(error) = self.send_join(membership).await {
                warn!(room = %membership.room, %error, "replay join failed");
                report.failures.push((membership.room.clone(), error));
            }
        }
        report
    }

    /// Broadcast `presence` into a joined room, routed through the room's
    /// interceptor. False when the room is not joined or the send fails.
    pub async fn publish_presence(&self, room: &BareJid, mut presence: Presence) -> bool {
        let memberships = self.memberships.lock().await;
        let Some(membership) = memberships.iter().find(|m| &m.room == room) else {
            return false;
        };
        if presence.to.is_none() {
            presence.to = Some(membership.room.clone().into());
        }
        if let Some(interceptor) = &membership.interceptor {
            presence = interceptor.intercept(presence);
        }
        self.manager.send(presence.into()).await
    }

    /// Room addresses currently tracked, in join order.
    pub async fn joined_rooms(&self) -> Vec<BareJid> {
        self.memberships
            .lock()
            .await
            .iter()
            .map(|m| m.room.clone())
            .collect()
    }

    async fn send_join(&self, membership: &Membership) -> Result<(), JoinError> {
        if self.manager.status() != Status::Authenticated {
            return Err(JoinError::NotConnected);
        }
        let presence = stanza::muc_join(
            &membership.room,
            &membership.nickname,
            membership.password.as_deref(),
        )
        .ok_or(JoinError::InvalidOccupant {
            room: membership.room.clone(),
        })?;
        let presence = match &membership.interceptor {
            Some(interceptor) => interceptor.intercept(presence),
            None => presence,
        };
        if self.manager.send(presence.into()).await {
            Ok(())
        } else {
            Err(JoinError::Rejected {
                room: membership.room.clone(),
            })
        }
    }

    /// Best effort; the room may already be gone along with the session.
    async fn send_leave(&self, membership: &Membership) -> bool {
        let Some(presence) = stanza::muc_leave(&membership.room, &membership.nickname) else {
            return false;
        };
        let presence = match &membership.interceptor {
            Some(interceptor) => interceptor.intercept(presence),
            None => presence,
        };
        self.manager.send(presence.into()).await
    }
}
