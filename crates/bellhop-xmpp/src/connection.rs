// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Bellhop Contributors

//! Session ownership and lifecycle.
//!
//! A [`ConnectionManager`] owns at most one live [`Session`] at a time.
//! Collaborators (room registry, stanza sender, reconnection policy) hold a
//! reference to the manager, never the session itself; that indirection is
//! what makes transparent reconnection possible.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use minidom::Element;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use xmpp_parsers::iq::{Iq, IqType};

use crate::config::SessionConfig;
use crate::iq::{IqCapability, IqHandler, IqReply, IqRequest, IqRequestKind};
use crate::session::{Connector, Session, SessionEvent};
use crate::stanza;
use crate::status::{Status, StatusCell};
use crate::ConnectionError;

type HandlerMap = HashMap<IqCapability, Arc<dyn IqHandler>>;

pub struct ConnectionManager {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    session: RwLock<Option<Arc<dyn Session>>>,
    status: StatusCell,
    handlers: Mutex<HandlerMap>,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Arc<Self> {
        Arc::new(Self {
            config,
            connector,
            session: RwLock::new(None),
            status: StatusCell::new(),
            handlers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Establish transport and complete authentication.
    ///
    /// Blocks until the session is authenticated or the attempt fails. An
    /// initial setup failure propagates to the caller and is never retried
    /// here; only post-authentication drops fall under the reconnection
    /// policy. Calling `connect` on an already-connected manager replaces
    /// the prior session.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ConnectionError> {
        match self.establish().await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.status.transition(Status::Disconnected);
                Err(error)
            }
        }
    }

    /// Re-establish after an unexpected drop. Same transitions as `connect`,
    /// but a failure is handed back to the reconnection policy instead of
    /// being surfaced as `Disconnected`.
    pub(crate) async fn reconnect(self: &Arc<Self>) -> Result<(), ConnectionError> {
        self.establish().await
    }

    async fn establish(self: &Arc<Self>) -> Result<(), ConnectionError> {
        if self.shutdown.is_cancelled() {
            return Err(ConnectionError::ShutDown);
        }

        self.status.transition(Status::Connecting);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session = self.connector.connect(&self.config, event_tx).await?;
        self.status.transition(Status::Connected);

        {
            let mut guard = self.session.write().await;
            // Shutdown may have won while the connector was in flight; the
            // slot is already drained, so the fresh session must not be
            // installed, only released.
            if self.shutdown.is_cancelled() {
                drop(guard);
                debug!("discarding session established during shutdown");
                session.close().await;
                return Err(ConnectionError::ShutDown);
            }
            if let Some(prior) = guard.take() {
                debug!("replacing prior session");
                prior.close().await;
            }
            *guard = Some(Arc::clone(&session));
        }

        // The connector completes SASL before returning, so the session is
        // authenticated by the time we hold it.
        self.status.transition(Status::Authenticated);
        info!(domain = %self.config.domain, "session authenticated");

        self.spawn_pump(session, event_rx);
        Ok(())
    }

    /// Current state; never blocks.
    pub fn status(&self) -> Status {
        self.status.current()
    }

    /// Observe every status transition from this point on, in order.
    pub fn subscribe_status(&self) -> mpsc::UnboundedReceiver<Status> {
        self.status.subscribe()
    }

    /// Hand a stanza to the live session. Returns false without side effect
    /// when no session is currently authenticated; never raises for the
    /// expected disconnected case.
    pub async fn send(&self, stanza: Element) -> bool {
        if self.status.current() != Status::Authenticated {
            return false;
        }
        let session = self.session.read().await.clone();
        match session {
            Some(session) => match session.send_stanza(stanza).await {
                Ok(()) => true,
                Err(error) => {
                    debug!(%error, "stanza send failed");
                    false
                }
            },
            None => false,
        }
    }

    /// Attach a handler for inbound queries matching `capability`. The
    /// registration lives on the manager and re-applies to every new
    /// session automatically.
    pub fn register_iq_handler(&self, capability: IqCapability, handler: Arc<dyn IqHandler>) {
        self.lock_handlers().insert(capability, handler);
    }

    /// Release the session and disable the manager permanently. Idempotent;
    /// cancels any in-flight reconnection attempt. `Closed` is the final
    /// transition observers see, and all further sends return false.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(session) = self.session.write().await.take() {
            session.close().await;
        }
        self.status.transition(Status::Closed);
        info!("connection manager shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) fn emit_status(&self, status: Status) {
        self.status.transition(status);
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Consume session events until the session drops or shutdown wins.
    fn spawn_pump(
        self: &Arc<Self>,
        session: Arc<dyn Session>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let manager = Arc::clone(self);
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => {
                        let reason = match event {
                            Some(SessionEvent::Stanza(elem)) => {
                                manager.route_stanza(&session, elem).await;
                                continue;
                            }
                            Some(SessionEvent::Disconnected(reason)) => reason,
                            None => "session event channel closed".to_string(),
                        };
                        manager.session_lost(&session, &reason).await;
                        break;
                    }
                }
            }
        });
    }

    async fn session_lost(&self, session: &Arc<dyn Session>, reason: &str) {
        let mut guard = self.session.write().await;
        // Only tear down if this pump's session is still the current one; a
        // replacement connect may already have installed a new session.
        let is_current = guard
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if !is_current {
            return;
        }
        *guard = None;
        drop(guard);

        warn!(reason, "session lost");
        self.status.transition(Status::ClosedOnError);
    }

    async fn route_stanza(&self, session: &Arc<dyn Session>, elem: Element) {
        if !elem.is("iq", "jabber:client") {
            trace!(stanza = elem.name(), "ignoring non-IQ stanza");
            return;
        }

        let iq = match Iq::try_from(elem) {
            Ok(iq) => iq,
            Err(error) => {
                warn!(%error, "failed to parse inbound IQ");
                return;
            }
        };

        let (kind, payload) = match iq.payload {
            IqType::Get(payload) => (IqRequestKind::Get, payload),
            IqType::Set(payload) => (IqRequestKind::Set, payload),
            IqType::Result(_) | IqType::Error(_) => {
                debug!(id = %iq.id, "ignoring unsolicited IQ response");
                return;
            }
        };

        let handler = {
            let handlers = self.lock_handlers();
            handlers
                .iter()
                .find(|(capability, _)| {
                    capability.element() == payload.name()
                        && capability.namespace() == payload.ns()
                })
                .map(|(_, handler)| Arc::clone(handler))
        };

        let reply = match handler {
            Some(handler) => {
                let request = IqRequest {
                    from: iq.from.clone(),
                    id: iq.id.clone(),
                    kind,
                    payload,
                };
                handler.handle(request).await
            }
            None => {
                debug!(
                    element = payload.name(),
                    namespace = %payload.ns(),
                    "no handler for inbound query"
                );
                IqReply::Error(stanza::service_unavailable())
            }
        };

        let reply_elem = match reply {
            IqReply::Result(payload) => stanza::iq_result(&iq.id, iq.from, payload),
            IqReply::Error(error) => stanza::iq_error(&iq.id, iq.from, error),
        };
        if let Err(error) = session.send_stanza(reply_elem).await {
            warn!(%error, "failed to send IQ reply");
        }
    }

    fn lock_handlers(&self) -> MutexGuard<'_, HandlerMap> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
