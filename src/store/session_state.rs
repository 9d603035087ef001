// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session State Store (`spec.md` §3, §6): the durable projection of each
//! session's lifecycle state, consulted by the Quota Oracle and updated by
//! the Backend Pump.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::model::{SessionLifecycleState, SessionState};

/// `spec.md` §6 schema:
/// ```sql
/// create table session_state (
///     user_id    text not null,
///     chat_id    text not null,
///     state      text not null,
///     created_at timestamptz not null default now(),
///     updated_at timestamptz not null default now(),
///     completed_at timestamptz,
///     primary key (user_id, chat_id)
/// );
/// ```
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    async fn get_state(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> anyhow::Result<Option<SessionState>>;

    async fn set_state(
        &self,
        user_id: &str,
        chat_id: &str,
        state: SessionLifecycleState,
    ) -> anyhow::Result<()>;

    async fn list_active_for_user(&self, user_id: &str) -> anyhow::Result<Vec<SessionState>>;

    async fn count_completed_for_user(&self, user_id: &str) -> anyhow::Result<i64>;

    /// `month` is formatted `"%Y-%m"`, matching the Quota Oracle's caller.
    async fn count_completed_for_user_in_month(
        &self,
        user_id: &str,
        month: &str,
    ) -> anyhow::Result<i64>;
}

#[async_trait]
impl SessionStateStore for std::sync::Arc<dyn SessionStateStore> {
    async fn get_state(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> anyhow::Result<Option<SessionState>> {
        (**self).get_state(user_id, chat_id).await
    }

    async fn set_state(
        &self,
        user_id: &str,
        chat_id: &str,
        state: SessionLifecycleState,
    ) -> anyhow::Result<()> {
        (**self).set_state(user_id, chat_id, state).await
    }

    async fn list_active_for_user(&self, user_id: &str) -> anyhow::Result<Vec<SessionState>> {
        (**self).list_active_for_user(user_id).await
    }

    async fn count_completed_for_user(&self, user_id: &str) -> anyhow::Result<i64> {
        (**self).count_completed_for_user(user_id).await
    }

    async fn count_completed_for_user_in_month(
        &self,
        user_id: &str,
        month: &str,
    ) -> anyhow::Result<i64> {
        (**self).count_completed_for_user_in_month(user_id, month).await
    }
}

pub struct PostgresSessionStateStore {
    pool: PgPool,
}

impl PostgresSessionStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStateStore for PostgresSessionStateStore {
    async fn get_state(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> anyhow::Result<Option<SessionState>> {
        let row = sqlx::query_as!(
            SessionState,
            r#"
            select user_id, chat_id,
                   state as "state: SessionLifecycleState",
                   created_at, updated_at, completed_at
            from session_state
            where user_id = $1 and chat_id = $2
            "#,
            user_id,
            chat_id,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_state(
        &self,
        user_id: &str,
        chat_id: &str,
        state: SessionLifecycleState,
    ) -> anyhow::Result<()> {
        let completed_at = (state == SessionLifecycleState::Complete).then(Utc::now);
        sqlx::query!(
            r#"
            insert into session_state (user_id, chat_id, state, created_at, updated_at, completed_at)
            values ($1, $2, $3, now(), now(), $4)
            on conflict (user_id, chat_id) do update
            set state = excluded.state,
                updated_at = now(),
                completed_at = coalesce(session_state.completed_at, excluded.completed_at)
            "#,
            user_id,
            chat_id,
            state.as_str(),
            completed_at,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_active_for_user(&self, user_id: &str) -> anyhow::Result<Vec<SessionState>> {
        let rows = sqlx::query_as!(
            SessionState,
            r#"
            select user_id, chat_id,
                   state as "state: SessionLifecycleState",
                   created_at, updated_at, completed_at
            from session_state
            where user_id = $1 and state in ('in_progress', 'clarify')
            "#,
            user_id,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_completed_for_user(&self, user_id: &str) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar!(
            r#"select count(*) as "count!" from session_state where user_id = $1 and state = 'complete'"#,
            user_id,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_completed_for_user_in_month(
        &self,
        user_id: &str,
        month: &str,
    ) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar!(
            r#"
            select count(*) as "count!"
            from session_state
            where user_id = $1
              and state = 'complete'
              and to_char(completed_at, 'YYYY-MM') = $2
            "#,
            user_id,
            month,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

/// In-memory store used by tests and by the scenario harness in `spec.md`
/// §8; not wired into production `run()`.
#[derive(Default)]
pub struct InMemorySessionStateStore {
    rows: Mutex<HashMap<(String, String), SessionState>>,
}

impl InMemorySessionStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStateStore for InMemorySessionStateStore {
    async fn get_state(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> anyhow::Result<Option<SessionState>> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows.get(&(user_id.to_owned(), chat_id.to_owned())).cloned())
    }

    async fn set_state(
        &self,
        user_id: &str,
        chat_id: &str,
        state: SessionLifecycleState,
    ) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let key = (user_id.to_owned(), chat_id.to_owned());
        let entry = rows.entry(key).or_insert_with(|| SessionState {
            user_id: user_id.to_owned(),
            chat_id: chat_id.to_owned(),
            state,
            created_at: now,
            updated_at: now,
            completed_at: None,
        });
        entry.state = state;
        entry.updated_at = now;
        if state == SessionLifecycleState::Complete && entry.completed_at.is_none() {
            entry.completed_at = Some(now);
        }
        Ok(())
    }

    async fn list_active_for_user(&self, user_id: &str) -> anyhow::Result<Vec<SessionState>> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows
            .values()
            .filter(|s| s.user_id == user_id && !s.state.is_terminal())
            .cloned()
            .collect())
    }

    async fn count_completed_for_user(&self, user_id: &str) -> anyhow::Result<i64> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows
            .values()
            .filter(|s| s.user_id == user_id && s.state == SessionLifecycleState::Complete)
            .count() as i64)
    }

    async fn count_completed_for_user_in_month(
        &self,
        user_id: &str,
        month: &str,
    ) -> anyhow::Result<i64> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows
            .values()
            .filter(|s| {
                s.user_id == user_id
                    && s.state == SessionLifecycleState::Complete
                    && s.completed_at.is_some_and(|ts| ts.format("%Y-%m").to_string() == month)
            })
            .count() as i64)
    }
}

#[cfg(test)]
#[path = "session_state_tests.rs"]
mod tests;
