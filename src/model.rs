// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core data model: session identity, durable state, and the outbox entry
//! shape shared by the stores, the pumps, and the wire layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a session: a (user_id, chat_id) pair. Both are opaque short
/// strings supplied by the out-of-scope auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: String,
    pub chat_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), chat_id: chat_id.into() }
    }

    /// The `"<user_id>__<chat_id>"` identity used by the storage layout in
    /// `spec.md` §6.
    pub fn storage_id(&self) -> String {
        format!("{}__{}", self.user_id, self.chat_id)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.chat_id)
    }
}

/// Durable session lifecycle state (`spec.md` §3, §4.2).
///
/// `InProgress`/`Clarify` are non-terminal and may transition freely between
/// each other. `Complete`/`Error` are terminal: once reached, the Backend
/// Pump has returned and no further transition is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionLifecycleState {
    InProgress,
    Clarify,
    Complete,
    Error,
}

impl SessionLifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Clarify => "clarify",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable projection of the state machine for one [`SessionKey`]
/// (`spec.md` §3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub user_id: String,
    pub chat_id: String,
    pub state: SessionLifecycleState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Classification of an outbound backend→client message (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxEntryKind {
    Progress,
    Clarify,
    Complete,
    Error,
}

impl OutboxEntryKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Clarify => "clarify",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

/// A durable, ordered outbox record (`spec.md` §3, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub session_key: SessionKey,
    pub payload: Vec<u8>,
    pub kind: OutboxEntryKind,
    pub created_at: DateTime<Utc>,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Maps a backend envelope `type` (see [`crate::envelope`]) to the canonical
/// lifecycle state and outbox kind it drives (`spec.md` §4.5, §6).
pub fn state_for_kind(kind: OutboxEntryKind) -> SessionLifecycleState {
    match kind {
        OutboxEntryKind::Progress => SessionLifecycleState::InProgress,
        OutboxEntryKind::Clarify => SessionLifecycleState::Clarify,
        OutboxEntryKind::Complete => SessionLifecycleState::Complete,
        OutboxEntryKind::Error => SessionLifecycleState::Error,
    }
}
