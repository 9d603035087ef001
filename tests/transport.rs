// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP-level integration tests for the transport layer, mirroring
//! `groblegark-coop`'s `tests/integration.rs` style: build the real router
//! over a fresh `Coordinator` and drive it with `axum_test::TestServer`.

use std::sync::Arc;

use axum::http::StatusCode;

use dr_gateway::config::{BackendScheme, GatewayConfig};
use dr_gateway::coordinator::Coordinator;
use dr_gateway::quota::{Admission, QuotaOracle, StaticEntitlementProvider, Tier, TierRules};
use dr_gateway::registry::SessionRegistry;
use dr_gateway::store::{InMemoryOutboxStore, InMemorySessionStateStore};
use dr_gateway::transport::build_router;

fn test_config() -> Arc<GatewayConfig> {
    Arc::new(GatewayConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        backend_host: "unused.invalid".to_owned(),
        backend_scheme: BackendScheme::Ws,
        handshake_timeout_ms: 50,
        outbox_max_age_secs: 3600,
        outbox_cleanup_interval_ms: 60_000,
        rate_limit_enabled: true,
        entitlement_fail_closed: false,
        database_url: "postgres://unused".to_owned(),
        database_max_connections: 1,
    })
}

fn test_coordinator() -> Arc<Coordinator> {
    let admission: Arc<dyn Admission> = Arc::new(QuotaOracle::new(
        InMemorySessionStateStore::new(),
        StaticEntitlementProvider::new(Tier {
            name: "pro".to_owned(),
            rules: TierRules { max_concurrent_active_sessions: None, lifetime_quota: None, monthly_quota: None },
        }),
        true,
        false,
    ));
    Arc::new(Coordinator::new(
        Arc::new(SessionRegistry::new()),
        Arc::new(InMemoryOutboxStore::new()),
        Arc::new(InMemorySessionStateStore::new()),
        admission,
        test_config(),
    ))
}

#[tokio::test]
async fn healthz_reports_zero_active_sessions_on_a_fresh_gateway() {
    let app = build_router(test_coordinator());
    let server = axum_test::TestServer::new(app).expect("create test server");

    let resp = server.get("/healthz").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_sessions"], 0);
}

#[tokio::test]
async fn ws_upgrade_without_user_id_header_is_rejected() {
    let app = build_router(test_coordinator());
    let server = axum_test::TestServer::new(app).expect("create test server");

    // No `X-User-Id` header and no websocket upgrade headers: the identity
    // extraction in `transport::auth` rejects before any upgrade is attempted.
    let resp = server.get("/ws/c1").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}
