// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lightweight parsing of the upstream backend envelope (`spec.md` §6).
//!
//! The Backend Pump needs only the `type` field (plus `error`/`final_report`
//! for the legacy terminal rules) to classify a frame; it never needs the
//! full `message`/`content` payload, which is forwarded to clients verbatim.

use serde::Deserialize;

use crate::model::OutboxEntryKind;

/// The fields the core reads out of a backend frame. Unknown fields are
/// ignored; this intentionally does not model `message`/`content` as typed
/// fields since the raw bytes are what get broadcast and archived.
#[derive(Debug, Default, Deserialize)]
struct Envelope<'a> {
    #[serde(default)]
    r#type: Option<&'a str>,
    #[serde(default)]
    error: Option<&'a str>,
    #[serde(default)]
    final_report: Option<&'a str>,
}

/// Classify a raw backend frame into the outbox kind it produces.
///
/// A non-empty `error` field is terminal regardless of `type`. A non-empty
/// `final_report` field is treated as `complete` (legacy marker, `spec.md`
/// §9). Otherwise `type` is mapped via the table in `spec.md` §6; an
/// unrecognized or missing `type` defaults to in-progress ("status").
pub fn classify(raw: &[u8]) -> OutboxEntryKind {
    let Ok(envelope) = serde_json::from_slice::<Envelope>(raw) else {
        return OutboxEntryKind::Progress;
    };

    if envelope.error.is_some_and(|e| !e.is_empty()) {
        return OutboxEntryKind::Error;
    }
    if envelope.final_report.is_some_and(|r| !r.is_empty()) {
        return OutboxEntryKind::Complete;
    }

    match envelope.r#type {
        Some("clarification_needed") => OutboxEntryKind::Clarify,
        Some("error") => OutboxEntryKind::Error,
        Some("research_complete") => OutboxEntryKind::Complete,
        // research_progress, unknown, or missing type: in-progress ("status").
        _ => OutboxEntryKind::Progress,
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
