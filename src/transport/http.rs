// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the gateway. The only HTTP surface is `/healthz`; all
//! session traffic is WebSocket (`transport::ws`).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::coordinator::Coordinator;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
}

pub async fn health(State(coordinator): State<Arc<Coordinator>>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", active_sessions: coordinator.active_session_count().await })
}
