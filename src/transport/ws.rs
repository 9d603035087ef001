// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-session WebSocket upgrade route: validates identity, then hands
//! the connection off to the [`Coordinator`] for the rest of its lifetime.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::coordinator::Coordinator;
use crate::socket::split_client;
use crate::transport::auth::extract_user_id;

/// `GET /ws/{chat_id}` — WebSocket upgrade for a deep research session.
pub async fn ws_handler(
    State(coordinator): State<Arc<Coordinator>>,
    Path(chat_id): Path<String>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let user_id = match extract_user_id(&headers) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };

    upgrade.on_upgrade(move |socket| async move {
        let (reader, writer) = split_client(socket);
        if let Err(err) =
            coordinator.attach(user_id.clone(), chat_id.clone(), Box::new(reader), Box::new(writer)).await
        {
            warn!(user_id, chat_id, error = %err, "session attach failed");
        }
    })
}
