// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Client Pump (`spec.md` §4.6): reads one attached client's socket and
//! forwards input to the backend, gated by the session's current lifecycle
//! state so a client can't write while research is already in progress.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::ClientErrorFrame;
use crate::model::SessionLifecycleState;
use crate::registry::{ActiveSession, ClientId};
use crate::socket::{ClientReader, Frame};
use crate::store::SessionStateStore;

/// Whether a client may currently write to the backend. `None` (no durable
/// state yet) and `Clarify` (backend is waiting on this answer) both accept
/// input; `InProgress` and the terminal states do not (`spec.md` §4.6).
pub fn is_forwardable(state: Option<SessionLifecycleState>) -> bool {
    matches!(state, None | Some(SessionLifecycleState::Clarify))
}

/// Runs until the client disconnects, the socket errors, or the session is
/// cancelled. A read failure or disconnect only unregisters this client; it
/// never cancels the session, since other clients may still be attached
/// (`spec.md` §4.6).
///
/// `reply_tx` is the same channel the client's outbound forwarder drains, so
/// a denial frame is interleaved correctly with broadcast traffic to this
/// client rather than racing a second writer against it.
pub async fn run(
    session: Arc<ActiveSession>,
    client_id: ClientId,
    mut reader: Box<dyn ClientReader>,
    reply_tx: mpsc::UnboundedSender<Frame>,
    state_store: Arc<dyn SessionStateStore>,
) {
    let key = session.key.clone();
    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => {
                break;
            }
            frame = reader.recv() => {
                match frame {
                    Ok(Some(frame)) => {
                        if let Err(err) = handle_frame(&session, &*state_store, &reply_tx, frame).await {
                            warn!(session = %key, client_id, error = %err, "failed to forward client frame");
                        }
                    }
                    Ok(None) => {
                        info!(session = %key, client_id, "client disconnected");
                        break;
                    }
                    Err(err) => {
                        warn!(session = %key, client_id, error = %err, "client read error");
                        break;
                    }
                }
            }
        }
    }

    session.remove_client(client_id).await;
}

async fn handle_frame(
    session: &ActiveSession,
    state_store: &dyn SessionStateStore,
    reply_tx: &mpsc::UnboundedSender<Frame>,
    frame: Frame,
) -> anyhow::Result<()> {
    let current = state_store
        .get_state(&session.key.user_id, &session.key.chat_id)
        .await?
        .map(|s| s.state);

    if !is_forwardable(current) {
        let denial = current.unwrap_or(SessionLifecycleState::InProgress);
        let json = ClientErrorFrame::gated(denial).to_json();
        reply_tx.send(Frame::Text(json)).map_err(|_| anyhow::anyhow!("client channel closed"))?;
        return Ok(());
    }

    session.write_to_backend(frame).await
}

#[cfg(test)]
#[path = "client_pump_tests.rs"]
mod tests;
