// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Quota Oracle (`spec.md` §4.3): a synchronous admission predicate
//! isolated from network code so it can be unit-tested directly
//! (`spec.md` §9 design note).

use async_trait::async_trait;

use crate::error::DenyReason;
use crate::model::{SessionLifecycleState, SessionState};
use crate::store::session_state::SessionStateStore;

/// Per-tier admission rules (`spec.md` §3 `TierRules`), static per deploy.
#[derive(Debug, Clone)]
pub struct TierRules {
    /// `None` means no cap (pro/plus tiers typically have none).
    pub max_concurrent_active_sessions: Option<u32>,
    /// `None` means unlimited.
    pub lifetime_quota: Option<u32>,
    /// `None` means unlimited / not monthly-gated.
    pub monthly_quota: Option<u32>,
}

impl TierRules {
    /// An unlimited tier admits unconditionally (`spec.md` §4.3).
    pub fn is_unlimited(&self) -> bool {
        self.lifetime_quota.is_none() && self.monthly_quota.is_none()
    }
}

/// A resolved tier name paired with its rules.
#[derive(Debug, Clone)]
pub struct Tier {
    pub name: String,
    pub rules: TierRules,
}

/// Entitlement lookup (`spec.md` §6): `get_tier(user_id) -> TierRules`.
///
/// Implementations may be a static table (tests), or an HTTP call to an
/// external billing/entitlement service in production.
#[async_trait]
pub trait EntitlementProvider: Send + Sync {
    async fn get_tier(&self, user_id: &str) -> anyhow::Result<Tier>;
}

/// A fixed entitlement table, useful for tests and for deploys with a
/// small, static set of tiers.
pub struct StaticEntitlementProvider {
    default_tier: Tier,
    overrides: std::collections::HashMap<String, Tier>,
}

impl StaticEntitlementProvider {
    pub fn new(default_tier: Tier) -> Self {
        Self { default_tier, overrides: std::collections::HashMap::new() }
    }

    pub fn with_override(mut self, user_id: impl Into<String>, tier: Tier) -> Self {
        self.overrides.insert(user_id.into(), tier);
        self
    }
}

#[async_trait]
impl EntitlementProvider for StaticEntitlementProvider {
    async fn get_tier(&self, user_id: &str) -> anyhow::Result<Tier> {
        Ok(self.overrides.get(user_id).cloned().unwrap_or_else(|| self.default_tier.clone()))
    }
}

#[derive(serde::Deserialize)]
struct EntitlementResponse {
    tier: String,
    max_concurrent_active_sessions: Option<u32>,
    lifetime_quota: Option<u32>,
    monthly_quota: Option<u32>,
}

/// Calls out to an external billing/entitlement service over HTTP.
pub struct HttpEntitlementProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpEntitlementProvider {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { base_url, client }
    }

    fn url(&self, user_id: &str) -> String {
        format!("{}/entitlements/{}", self.base_url, user_id)
    }
}

#[async_trait]
impl EntitlementProvider for HttpEntitlementProvider {
    async fn get_tier(&self, user_id: &str) -> anyhow::Result<Tier> {
        let resp = self.client.get(self.url(user_id)).send().await?;
        let body: EntitlementResponse = resp.error_for_status()?.json().await?;
        Ok(Tier {
            name: body.tier,
            rules: TierRules {
                max_concurrent_active_sessions: body.max_concurrent_active_sessions,
                lifetime_quota: body.lifetime_quota,
                monthly_quota: body.monthly_quota,
            },
        })
    }
}

/// The Quota Oracle: `admit(user_id, chat_id, is_reconnect) -> Ok | Deny`.
pub struct QuotaOracle<S, E> {
    state_store: S,
    entitlement: E,
    enabled: bool,
    fail_closed: bool,
}

impl<S, E> QuotaOracle<S, E>
where
    S: SessionStateStore,
    E: EntitlementProvider,
{
    pub fn new(state_store: S, entitlement: E, enabled: bool, fail_closed: bool) -> Self {
        Self { state_store, entitlement, enabled, fail_closed }
    }

    /// Run the admission predicate described in `spec.md` §4.3.
    pub async fn admit(
        &self,
        user_id: &str,
        chat_id: &str,
        is_reconnect: bool,
    ) -> Result<(), DenyReason> {
        if !self.enabled {
            return Ok(());
        }

        let tier = match self.entitlement.get_tier(user_id).await {
            Ok(tier) => tier,
            Err(_) if self.fail_closed => {
                return Err(DenyReason::SubscriptionCheckFailed);
            }
            Err(_) => return Ok(()),
        };

        if tier.rules.is_unlimited() {
            return Ok(());
        }

        let existing = self.state_store.get_state(user_id, chat_id).await.ok().flatten();

        if is_reconnect {
            if let Some(ref state) = existing {
                if !state.state.is_terminal() {
                    return Ok(());
                }
            }
        }

        if let Some(ref state) = existing {
            if state.state.is_terminal() {
                return self.check_completion_quota(user_id, &tier.rules).await;
            }
        }

        // No prior session for this key: check concurrency and lifetime caps.
        if tier.rules.max_concurrent_active_sessions == Some(1) {
            let active = self.state_store.list_active_for_user(user_id).await.unwrap_or_default();
            if !active.is_empty() {
                return Err(DenyReason::ActiveSessionExists);
            }
        }

        if let Some(limit) = tier.rules.lifetime_quota {
            let completed = self.state_store.count_completed_for_user(user_id).await.unwrap_or(0);
            if completed >= limit as i64 {
                return Err(DenyReason::FreeLimitReached);
            }
        }

        Ok(())
    }

    async fn check_completion_quota(
        &self,
        user_id: &str,
        rules: &TierRules,
    ) -> Result<(), DenyReason> {
        if let Some(limit) = rules.lifetime_quota {
            let completed = self.state_store.count_completed_for_user(user_id).await.unwrap_or(0);
            if completed >= limit as i64 {
                return Err(DenyReason::FreeLimitReached);
            }
        }
        if let Some(limit) = rules.monthly_quota {
            let month = chrono::Utc::now().format("%Y-%m").to_string();
            let completed = self
                .state_store
                .count_completed_for_user_in_month(user_id, &month)
                .await
                .unwrap_or(0);
            if completed >= limit as i64 {
                return Err(DenyReason::MonthlyQuotaExceeded);
            }
        }
        Ok(())
    }
}

/// Convenience for callers that already hold a [`SessionState`] and want to
/// know whether it is eligible for reconnection without a store round trip.
pub fn is_reconnectable(state: &SessionState) -> bool {
    !matches!(state.state, SessionLifecycleState::Complete | SessionLifecycleState::Error)
}

/// Object-safe facade over [`QuotaOracle`], so the Coordinator can hold an
/// admission check without naming its store/entitlement type parameters.
#[async_trait]
pub trait Admission: Send + Sync {
    async fn admit(&self, user_id: &str, chat_id: &str, is_reconnect: bool) -> Result<(), DenyReason>;
}

#[async_trait]
impl<S, E> Admission for QuotaOracle<S, E>
where
    S: SessionStateStore,
    E: EntitlementProvider,
{
    async fn admit(&self, user_id: &str, chat_id: &str, is_reconnect: bool) -> Result<(), DenyReason> {
        QuotaOracle::admit(self, user_id, chat_id, is_reconnect).await
    }
}

#[cfg(test)]
#[path = "quota_tests.rs"]
mod tests;
