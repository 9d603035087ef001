// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! dr-gateway: a WebSocket multiplexing gateway that sits between a deep
//! research backend and its clients, multiplexing many browser tabs onto
//! one upstream session and guaranteeing at-least-once delivery of backend
//! frames across client reconnects.

pub mod backend_pump;
pub mod client_pump;
pub mod config;
pub mod coordinator;
pub mod envelope;
pub mod error;
pub mod model;
pub mod quota;
pub mod registry;
pub mod socket;
pub mod store;
pub mod transport;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::coordinator::Coordinator;
use crate::quota::{Admission, QuotaOracle, StaticEntitlementProvider, Tier, TierRules};
use crate::registry::SessionRegistry;
use crate::store::{OutboxStore, PostgresOutboxStore, PostgresSessionStateStore, SessionStateStore};
use crate::transport::build_router;

/// Default tier table until a real entitlement service is wired in
/// (`spec.md` §9 open question: monthly quota as a configurable attribute,
/// not a hardcoded number).
fn default_entitlement_provider() -> StaticEntitlementProvider {
    StaticEntitlementProvider::new(Tier {
        name: "free".to_owned(),
        rules: TierRules {
            max_concurrent_active_sessions: Some(1),
            lifetime_quota: Some(2),
            monthly_quota: None,
        },
    })
}

/// Run the gateway until shutdown.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    let outbox: Arc<dyn OutboxStore> = Arc::new(PostgresOutboxStore::new(pool.clone()));
    let state_store: Arc<dyn SessionStateStore> = Arc::new(PostgresSessionStateStore::new(pool));
    let registry = Arc::new(SessionRegistry::new());

    let admission: Arc<dyn Admission> = Arc::new(QuotaOracle::new(
        state_store.clone(),
        default_entitlement_provider(),
        config.rate_limit_enabled,
        config.entitlement_fail_closed,
    ));

    let config = Arc::new(config);
    let coordinator = Arc::new(Coordinator::new(
        registry.clone(),
        outbox.clone(),
        state_store.clone(),
        admission,
        config.clone(),
    ));

    spawn_outbox_cleanup(outbox.clone(), config.clone(), shutdown.clone());

    info!(%addr, "dr-gateway listening");
    let router = build_router(coordinator);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

/// Periodic outbox cleanup (`spec.md` §4, ambient stack), grounded on the
/// teacher's `spawn_health_checker` background-task pattern.
fn spawn_outbox_cleanup(
    outbox: Arc<dyn OutboxStore>,
    config: Arc<GatewayConfig>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.outbox_cleanup_interval());
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let cutoff = chrono::Utc::now() - config.outbox_max_age();
                    match outbox.cleanup(cutoff).await {
                        Ok(removed) if removed > 0 => info!(removed, "outbox cleanup removed stale entries"),
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "outbox cleanup failed"),
                    }
                }
            }
        }
    });
}

