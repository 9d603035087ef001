// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory registry of active sessions (`spec.md` §4.4): one
//! [`ActiveSession`] per (user_id, chat_id) with a live backend connection,
//! shared by every attached client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::model::SessionKey;
use crate::socket::{BackendWriter, Frame};

pub type ClientId = u64;

/// A live session: the serialized backend writer (spec.md §4.4 "writes to
/// the backend are serialized") and the set of attached client fan-out
/// channels.
pub struct ActiveSession {
    pub key: SessionKey,
    backend_writer: Mutex<Box<dyn BackendWriter>>,
    clients: RwLock<HashMap<ClientId, mpsc::UnboundedSender<Frame>>>,
    next_client_id: AtomicU64,
    pub cancel: CancellationToken,
}

impl ActiveSession {
    fn new(key: SessionKey, backend_writer: Box<dyn BackendWriter>) -> Self {
        Self {
            key,
            backend_writer: Mutex::new(backend_writer),
            clients: RwLock::new(HashMap::new()),
            next_client_id: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a client's outbound channel; returns its id for later
    /// removal. The caller owns the paired receiver and forwards frames to
    /// the real client socket.
    pub async fn add_client(&self, sender: mpsc::UnboundedSender<Frame>) -> ClientId {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.clients.write().await.insert(id, sender);
        id
    }

    pub async fn remove_client(&self, id: ClientId) {
        self.clients.write().await.remove(&id);
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Fan a backend frame out to every attached client. Disconnected
    /// clients are pruned lazily by their own pump; a send failure here is
    /// not an error for the session.
    pub async fn broadcast(&self, frame: Frame) {
        let clients = self.clients.read().await;
        for sender in clients.values() {
            let _ = sender.send(frame.clone());
        }
    }

    /// Write a client-originated frame to the backend, serialized against
    /// concurrent writes from other clients of the same session (`spec.md`
    /// §4.4, §4.6).
    pub async fn write_to_backend(&self, frame: Frame) -> anyhow::Result<()> {
        let mut writer = self.backend_writer.lock().await;
        writer.send(frame).await
    }

    pub async fn close_backend(&self) {
        let mut writer = self.backend_writer.lock().await;
        let _ = writer.close().await;
    }
}

/// Registry of all active sessions on this gateway instance (`spec.md`
/// §4.4).
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<ActiveSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has_active(&self, key: &SessionKey) -> bool {
        self.sessions.read().await.contains_key(&key.storage_id())
    }

    pub async fn get(&self, key: &SessionKey) -> Option<Arc<ActiveSession>> {
        self.sessions.read().await.get(&key.storage_id()).cloned()
    }

    /// Create and register a new active session. Callers must ensure
    /// `has_active` was false and hold whatever external lock prevents a
    /// concurrent double-create for the same key (`spec.md` §4.7 dial
    /// serialization is handled by the Coordinator, not here).
    pub async fn create(&self, key: SessionKey, backend_writer: Box<dyn BackendWriter>) -> Arc<ActiveSession> {
        let entry = Arc::new(ActiveSession::new(key.clone(), backend_writer));
        self.sessions.write().await.insert(key.storage_id(), entry.clone());
        entry
    }

    pub async fn remove(&self, key: &SessionKey) {
        if let Some(session) = self.sessions.write().await.remove(&key.storage_id()) {
            session.cancel.cancel();
        }
    }

    /// Diagnostic snapshot of live session keys, for `/healthz` and
    /// operational visibility.
    pub async fn list_keys(&self) -> Vec<SessionKey> {
        self.sessions.read().await.values().map(|s| s.key.clone()).collect()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
