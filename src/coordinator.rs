// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Coordinator (`spec.md` §4.7): the single entry point a transport
//! handler calls when a client attaches to a session. It owns admission,
//! dialing the backend on first attach, and the ordered replay of durable
//! outbox entries that must complete before a reconnecting client is
//! registered for live broadcast.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::client_pump;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::model::SessionKey;
use crate::quota::Admission;
use crate::registry::{ActiveSession, SessionRegistry};
use crate::socket::{split_backend, ClientReader, ClientWriter, Frame};
use crate::backend_pump;
use crate::store::{OutboxStore, SessionStateStore};

pub struct Coordinator {
    registry: Arc<SessionRegistry>,
    outbox: Arc<dyn OutboxStore>,
    state_store: Arc<dyn SessionStateStore>,
    admission: Arc<dyn Admission>,
    config: Arc<GatewayConfig>,
    /// Serializes the check-then-dial sequence per key so two concurrent
    /// attach calls for the same session never both dial the backend
    /// (`spec.md` §8 property 1). Held only around the dial, not for the
    /// lifetime of the session.
    dial_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Coordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        outbox: Arc<dyn OutboxStore>,
        state_store: Arc<dyn SessionStateStore>,
        admission: Arc<dyn Admission>,
        config: Arc<GatewayConfig>,
    ) -> Self {
        Self { registry, outbox, state_store, admission, config, dial_locks: Mutex::new(HashMap::new()) }
    }

    async fn dial_lock(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        self.dial_locks.lock().await.entry(key.storage_id()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Diagnostic snapshot for `/healthz`.
    pub async fn active_session_count(&self) -> usize {
        self.registry.session_count().await
    }

    /// Attach a client's socket to a session. Blocks until the client
    /// disconnects or the session ends (`spec.md` §4.7).
    pub async fn attach(
        &self,
        user_id: String,
        chat_id: String,
        client_reader: Box<dyn ClientReader>,
        client_writer: Box<dyn ClientWriter>,
    ) -> Result<(), GatewayError> {
        let key = SessionKey::new(user_id.clone(), chat_id.clone());

        let prior_state =
            self.state_store.get_state(&user_id, &chat_id).await.map_err(GatewayError::Storage)?;
        let is_reconnect = self.registry.has_active(&key).await || prior_state.is_some();

        self.admission
            .admit(&user_id, &chat_id, is_reconnect)
            .await
            .map_err(|reason| GatewayError::AdmissionDenied { reason })?;

        if let Some(active) = self.registry.get(&key).await {
            info!(session = %key, "attaching client to already-live session");
            return self.serve_client(active, client_reader, client_writer).await;
        }

        if self.outbox.is_complete(&user_id, &chat_id).await.map_err(GatewayError::Storage)? {
            info!(session = %key, "session already complete; replaying history and closing");
            return self.replay_and_close(&key, client_writer).await;
        }

        // Serialize the remaining check-then-dial sequence per key: without
        // this, two attaches racing past the checks above could both dial
        // the backend for the same session (`spec.md` §8 property 1). The
        // lock is held only for this block, not across `serve_client` below
        // — it must not block a second attacher's entire session lifetime
        // on a dial that already happened.
        enum Resolved {
            Active(Arc<ActiveSession>),
            Complete,
        }

        let resolved = {
            let lock = self.dial_lock(&key).await;
            let _dial_guard = lock.lock().await;

            if let Some(active) = self.registry.get(&key).await {
                info!(session = %key, "attaching client to session dialed by a concurrent attach");
                Resolved::Active(active)
            } else if self.outbox.is_complete(&user_id, &chat_id).await.map_err(GatewayError::Storage)? {
                Resolved::Complete
            } else {
                Resolved::Active(self.dial(&key).await?)
            }
        };

        match resolved {
            Resolved::Active(session) => self.serve_client(session, client_reader, client_writer).await,
            Resolved::Complete => self.replay_and_close(&key, client_writer).await,
        }
    }

    async fn dial(&self, key: &SessionKey) -> Result<Arc<ActiveSession>, GatewayError> {
        let url = self.config.backend_url(&key.user_id, &key.chat_id);
        let (ws_stream, _) = tokio::time::timeout(
            self.config.handshake_timeout(),
            tokio_tungstenite::connect_async(&url),
        )
        .await
        .map_err(|_| GatewayError::BackendUnreachable("handshake timed out".to_owned()))?
        .map_err(|e| GatewayError::BackendUnreachable(e.to_string()))?;

        let (backend_reader, backend_writer) = split_backend(ws_stream);
        let session = self.registry.create(key.clone(), Box::new(backend_writer)).await;

        tokio::spawn(backend_pump::run(
            session.clone(),
            Box::new(backend_reader),
            self.registry.clone(),
            self.outbox.clone(),
            self.state_store.clone(),
        ));

        Ok(session)
    }

    /// Replay unsent outbox entries, then hand the client off to a
    /// forwarder task and the Client Pump. The replay happens before
    /// `add_client` registers this client for live broadcast, so nothing
    /// sent after attach can be delivered twice and nothing durable is
    /// skipped (`spec.md` §4.7).
    async fn serve_client(
        &self,
        session: Arc<ActiveSession>,
        client_reader: Box<dyn ClientReader>,
        mut client_writer: Box<dyn ClientWriter>,
    ) -> Result<(), GatewayError> {
        self.replay_unsent(&session.key, &mut client_writer).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward_to_client(rx, client_writer));
        let client_id = session.add_client(tx.clone()).await;

        client_pump::run(session.clone(), client_id, client_reader, tx, self.state_store.clone())
            .await;

        let _ = forwarder.await;
        Ok(())
    }

    async fn replay_and_close(
        &self,
        key: &SessionKey,
        mut client_writer: Box<dyn ClientWriter>,
    ) -> Result<(), GatewayError> {
        self.replay_unsent(key, &mut client_writer).await?;
        let _ = client_writer.close().await;
        Ok(())
    }

    async fn replay_unsent(
        &self,
        key: &SessionKey,
        writer: &mut Box<dyn ClientWriter>,
    ) -> Result<(), GatewayError> {
        let entries = self
            .outbox
            .list_unsent(&key.user_id, &key.chat_id)
            .await
            .map_err(GatewayError::Storage)?;

        for entry in entries {
            let frame = match String::from_utf8(entry.payload.clone()) {
                Ok(text) => Frame::Text(text),
                Err(_) => Frame::Binary(entry.payload.clone()),
            };
            writer.send(frame).await.map_err(|e| GatewayError::SocketWrite(e.to_string()))?;
            self.outbox.mark_sent(entry.id).await.map_err(GatewayError::Storage)?;
        }

        Ok(())
    }
}

async fn forward_to_client(
    mut rx: mpsc::UnboundedReceiver<Frame>,
    mut writer: Box<dyn ClientWriter>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(err) = writer.send(frame).await {
            warn!(error = %err, "client forwarder write failed, dropping client");
            break;
        }
    }
    let _ = writer.close().await;
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
