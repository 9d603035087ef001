// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbox Store (`spec.md` §3, §4.1, §4.5): the durable, append-only log of
//! backend→client frames that backs at-least-once delivery across
//! reconnects.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::model::{OutboxEntry, OutboxEntryKind};

/// `spec.md` §6 schema:
/// ```sql
/// create table outbox (
///     id         uuid primary key,
///     user_id    text not null,
///     chat_id    text not null,
///     payload    bytea not null,
///     kind       text not null,
///     created_at timestamptz not null default now(),
///     sent       boolean not null default false,
///     sent_at    timestamptz
/// );
/// create index outbox_session_idx on outbox (user_id, chat_id, created_at);
/// ```
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn append(
        &self,
        user_id: &str,
        chat_id: &str,
        payload: Vec<u8>,
        kind: OutboxEntryKind,
    ) -> anyhow::Result<OutboxEntry>;

    /// Entries not yet marked sent, in `created_at` order — the replay set
    /// for a reconnecting client (`spec.md` §4.7).
    async fn list_unsent(&self, user_id: &str, chat_id: &str) -> anyhow::Result<Vec<OutboxEntry>>;

    async fn mark_sent(&self, id: Uuid) -> anyhow::Result<()>;

    async fn mark_all_sent(&self, user_id: &str, chat_id: &str) -> anyhow::Result<()>;

    /// Whether a terminal (complete/error) entry has ever been appended for
    /// this session — used to short-circuit replay of an already-finished
    /// session (`spec.md` §4.7).
    async fn is_complete(&self, user_id: &str, chat_id: &str) -> anyhow::Result<bool>;

    /// Deletes sent entries older than `older_than`; returns the row count
    /// removed. Invoked by the periodic cleanup task (`spec.md` §4, ambient
    /// stack).
    async fn cleanup(&self, older_than: DateTime<Utc>) -> anyhow::Result<u64>;
}

pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn append(
        &self,
        user_id: &str,
        chat_id: &str,
        payload: Vec<u8>,
        kind: OutboxEntryKind,
    ) -> anyhow::Result<OutboxEntry> {
        let id = Uuid::new_v4();
        let kind_str = kind.as_str();
        let row = sqlx::query!(
            r#"
            insert into outbox (id, user_id, chat_id, payload, kind, created_at, sent)
            values ($1, $2, $3, $4, $5, now(), false)
            returning created_at
            "#,
            id,
            user_id,
            chat_id,
            payload,
            kind_str,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OutboxEntry {
            id,
            session_key: crate::model::SessionKey::new(user_id, chat_id),
            payload,
            kind,
            created_at: row.created_at,
            sent: false,
            sent_at: None,
        })
    }

    async fn list_unsent(&self, user_id: &str, chat_id: &str) -> anyhow::Result<Vec<OutboxEntry>> {
        let rows = sqlx::query!(
            r#"
            select id, payload, kind, created_at, sent, sent_at
            from outbox
            where user_id = $1 and chat_id = $2 and sent = false
            order by created_at asc
            "#,
            user_id,
            chat_id,
        )
        .fetch_all(&self.pool)
        .await?;

        let key = crate::model::SessionKey::new(user_id, chat_id);
        rows.into_iter()
            .map(|row| {
                Ok(OutboxEntry {
                    id: row.id,
                    session_key: key.clone(),
                    payload: row.payload,
                    kind: parse_kind(&row.kind)?,
                    created_at: row.created_at,
                    sent: row.sent,
                    sent_at: row.sent_at,
                })
            })
            .collect()
    }

    async fn mark_sent(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query!("update outbox set sent = true, sent_at = now() where id = $1", id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_all_sent(&self, user_id: &str, chat_id: &str) -> anyhow::Result<()> {
        sqlx::query!(
            "update outbox set sent = true, sent_at = now() where user_id = $1 and chat_id = $2 and sent = false",
            user_id,
            chat_id,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_complete(&self, user_id: &str, chat_id: &str) -> anyhow::Result<bool> {
        let row = sqlx::query_scalar!(
            r#"select count(*) as "count!" from outbox where user_id = $1 and chat_id = $2 and kind in ('complete', 'error')"#,
            user_id,
            chat_id,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row > 0)
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query!(
            "delete from outbox where sent = true and created_at < $1",
            older_than,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn parse_kind(raw: &str) -> anyhow::Result<OutboxEntryKind> {
    match raw {
        "progress" => Ok(OutboxEntryKind::Progress),
        "clarify" => Ok(OutboxEntryKind::Clarify),
        "complete" => Ok(OutboxEntryKind::Complete),
        "error" => Ok(OutboxEntryKind::Error),
        other => Err(anyhow::anyhow!("unrecognized outbox kind {other:?}")),
    }
}

/// In-memory store used by tests.
#[derive(Default)]
pub struct InMemoryOutboxStore {
    entries: Mutex<Vec<OutboxEntry>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn append(
        &self,
        user_id: &str,
        chat_id: &str,
        payload: Vec<u8>,
        kind: OutboxEntryKind,
    ) -> anyhow::Result<OutboxEntry> {
        let entry = OutboxEntry {
            id: Uuid::new_v4(),
            session_key: crate::model::SessionKey::new(user_id, chat_id),
            payload,
            kind,
            created_at: Utc::now(),
            sent: false,
            sent_at: None,
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn list_unsent(&self, user_id: &str, chat_id: &str) -> anyhow::Result<Vec<OutboxEntry>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .iter()
            .filter(|e| {
                e.session_key.user_id == user_id && e.session_key.chat_id == chat_id && !e.sent
            })
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: Uuid) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.sent = true;
            entry.sent_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_all_sent(&self, user_id: &str, chat_id: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        for entry in entries.iter_mut() {
            if entry.session_key.user_id == user_id && entry.session_key.chat_id == chat_id {
                entry.sent = true;
                entry.sent_at = Some(now);
            }
        }
        Ok(())
    }

    async fn is_complete(&self, user_id: &str, chat_id: &str) -> anyhow::Result<bool> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.iter().any(|e| {
            e.session_key.user_id == user_id
                && e.session_key.chat_id == chat_id
                && e.kind.is_terminal()
        }))
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|e| !(e.sent && e.created_at < older_than));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
#[path = "outbox_tests.rs"]
mod tests;
