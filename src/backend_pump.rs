// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Backend Pump (`spec.md` §4.5): the single reader of a session's
//! upstream connection. Every frame is classified, persisted to the Outbox
//! Store, broadcast to attached clients, and reflected into the Session
//! State Store, in that order, before the next frame is read.

use std::sync::Arc;

use tracing::{info, warn};

use crate::envelope::classify;
use crate::model::state_for_kind;
use crate::registry::{ActiveSession, SessionRegistry};
use crate::socket::{BackendReader, Frame};
use crate::store::{OutboxStore, SessionStateStore};

/// Runs until the backend closes the connection or a terminal frame is
/// classified, whichever comes first. Always removes the session from the
/// registry on exit (`spec.md` §4.5): a terminal frame ends the session by
/// design, and an unexpected close leaves no live backend to serve further
/// client writes.
pub async fn run(
    session: Arc<ActiveSession>,
    mut reader: Box<dyn BackendReader>,
    registry: Arc<SessionRegistry>,
    outbox: Arc<dyn OutboxStore>,
    state_store: Arc<dyn SessionStateStore>,
) {
    let key = session.key.clone();
    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => {
                info!(session = %key, "backend pump cancelled");
                break;
            }
            frame = reader.recv() => {
                match frame {
                    Ok(Some(frame)) => {
                        handle_frame(&session, &*outbox, &*state_store, frame).await;
                        if session.cancel.is_cancelled() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!(session = %key, "backend closed connection");
                        break;
                    }
                    Err(err) => {
                        warn!(session = %key, error = %err, "backend read error");
                        break;
                    }
                }
            }
        }
    }

    registry.remove(&key).await;
}

/// Broadcast first, persist best-effort (`spec.md` §4.1, §4.5): a degraded
/// outbox or state store must never block a live stream, and a terminal
/// frame must still cancel the session even if both stores are down.
async fn handle_frame(
    session: &ActiveSession,
    outbox: &dyn OutboxStore,
    state_store: &dyn SessionStateStore,
    frame: Frame,
) {
    let payload = frame.clone().into_bytes();
    let kind = classify(&payload);
    let lifecycle = state_for_kind(kind);
    let key = &session.key;

    session.broadcast(frame).await;
    let delivered = session.client_count().await > 0;

    match outbox.append(&key.user_id, &key.chat_id, payload, kind).await {
        Ok(entry) if delivered => {
            if let Err(err) = outbox.mark_sent(entry.id).await {
                warn!(session = %key, error = %err, "failed to mark outbox entry sent");
            }
        }
        Ok(_) => {}
        Err(err) => warn!(session = %key, error = %err, "failed to append outbox entry"),
    }

    if let Err(err) = state_store.set_state(&key.user_id, &key.chat_id, lifecycle).await {
        warn!(session = %key, error = %err, "failed to persist session state");
    }

    if kind.is_terminal() {
        session.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "backend_pump_tests.rs"]
mod tests;
