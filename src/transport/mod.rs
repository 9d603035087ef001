// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the gateway: `/healthz` and the
//! per-session WS upgrade route.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::coordinator::Coordinator;

pub fn build_router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/healthz", get(http::health))
        .route("/ws/{chat_id}", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(coordinator)
}
