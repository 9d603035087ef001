// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway configuration, read from CLI flags or environment variables
//! (`spec.md` §6 configuration keys), following the teacher's `MuxConfig`
//! `#[arg(long, env = "...")]` convention.

use std::time::Duration;

/// Upstream backend WS scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum BackendScheme {
    Ws,
    Wss,
}

impl BackendScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "dr-gateway", about = "Deep research session multiplexing gateway")]
pub struct GatewayConfig {
    /// Host to bind the downstream HTTP/WS listener on.
    #[arg(long, default_value = "127.0.0.1", env = "GATEWAY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "GATEWAY_PORT")]
    pub port: u16,

    /// Upstream backend host:port, used to construct the per-session dial
    /// URL `{scheme}://{host}/deep_research/{user_id}/{chat_id}/`.
    #[arg(long, env = "BACKEND_HOST")]
    pub backend_host: String,

    /// Upstream backend scheme.
    #[arg(long, value_enum, default_value_t = BackendScheme::Ws, env = "BACKEND_SCHEME")]
    pub backend_scheme: BackendScheme,

    /// Backend dial handshake timeout in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "HANDSHAKE_TIMEOUT")]
    pub handshake_timeout_ms: u64,

    /// Outbox retention window in seconds; entries older than this are
    /// eligible for the periodic `cleanup` job.
    #[arg(long, default_value_t = 7 * 24 * 3600, env = "OUTBOX_MAX_AGE")]
    pub outbox_max_age_secs: i64,

    /// Interval between outbox cleanup passes, in milliseconds.
    #[arg(long, default_value_t = 3_600_000, env = "OUTBOX_CLEANUP_INTERVAL_MS")]
    pub outbox_cleanup_interval_ms: u64,

    /// Whether the Quota Oracle is consulted at attach time. When disabled,
    /// every attach is admitted unconditionally.
    #[arg(long, default_value_t = true, env = "RATE_LIMIT_ENABLED", action = clap::ArgAction::Set)]
    pub rate_limit_enabled: bool,

    /// If the entitlement lookup fails, deny admission rather than allow it.
    #[arg(long, default_value_t = false, env = "ENTITLEMENT_FAIL_CLOSED")]
    pub entitlement_fail_closed: bool,

    /// Postgres connection string backing the Outbox Store and Session
    /// State Store.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Max connections in the Postgres pool.
    #[arg(long, default_value_t = 10, env = "DATABASE_MAX_CONNECTIONS")]
    pub database_max_connections: u32,
}

impl GatewayConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn outbox_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.outbox_max_age_secs)
    }

    pub fn outbox_cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.outbox_cleanup_interval_ms)
    }

    /// Build the upstream dial URL for a session, per `spec.md` §6.
    pub fn backend_url(&self, user_id: &str, chat_id: &str) -> String {
        format!(
            "{}://{}/deep_research/{}/{}/",
            self.backend_scheme.as_str(),
            self.backend_host,
            user_id,
            chat_id
        )
    }
}
