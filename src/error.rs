// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the gateway (`spec.md` §7), generalized from the
//! teacher's `MuxError`: a machine-readable code, an HTTP status for the
//! handful of errors that ever reach an HTTP response, and a JSON body shape
//! matching `spec.md` §6.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for the gateway core.
///
/// Pumps never construct new variants upward (`spec.md` §7): they either
/// continue past a transient storage error, unregister a client, or cancel
/// the session. Only the Coordinator converts a [`GatewayError`] into a
/// client-visible JSON frame.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("admission denied: {reason}")]
    AdmissionDenied { reason: DenyReason },

    #[error("backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("socket closed")]
    SocketClosed,

    #[error("socket write failed: {0}")]
    SocketWrite(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("invalid session key")]
    InvalidSessionKey,
}

/// Structured denial reasons returned by the Quota Oracle (`spec.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    FreeLimitReached,
    ActiveSessionExists,
    MonthlyQuotaExceeded,
    SubscriptionCheckFailed,
}

impl DenyReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::FreeLimitReached => "FREE_LIMIT_REACHED",
            Self::ActiveSessionExists => "ACTIVE_SESSION_EXISTS",
            Self::MonthlyQuotaExceeded => "MONTHLY_QUOTA_EXCEEDED",
            Self::SubscriptionCheckFailed => "SUBSCRIPTION_CHECK_FAILED",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::FreeLimitReached => "free tier lifetime quota exhausted",
            Self::ActiveSessionExists => "an active session already exists for this user",
            Self::MonthlyQuotaExceeded => "monthly completion quota exceeded",
            Self::SubscriptionCheckFailed => "could not verify subscription entitlement",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// `{"error":"<message>"}` and `{"error":"<message>","error_code":"<code>"}`
/// client-visible error frame (`spec.md` §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientErrorFrame {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_state: Option<String>,
}

impl ClientErrorFrame {
    pub fn generic(message: impl Into<String>) -> Self {
        Self { error: message.into(), error_code: None, session_state: None }
    }

    pub fn denial(reason: DenyReason) -> Self {
        Self {
            error: reason.message().to_owned(),
            error_code: Some(reason.code().to_owned()),
            session_state: None,
        }
    }

    pub fn gated(state: crate::model::SessionLifecycleState) -> Self {
        Self {
            error: "Cannot send messages while research is in progress".to_owned(),
            error_code: None,
            session_state: Some(state.as_str().to_owned()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"internal error serializing error frame"}"#.to_owned())
    }
}

/// HTTP-facing error envelope, matching the teacher's `ErrorResponse`.
#[derive(Debug, Serialize)]
struct HttpErrorBody {
    error: ClientErrorFrame,
}

impl GatewayError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::AdmissionDenied { .. } => StatusCode::FORBIDDEN,
            Self::BackendUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::SocketClosed | Self::SocketWrite(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidSessionKey => StatusCode::BAD_REQUEST,
        }
    }

    pub fn client_frame(&self) -> ClientErrorFrame {
        match self {
            Self::AdmissionDenied { reason } => ClientErrorFrame::denial(*reason),
            other => ClientErrorFrame::generic(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = HttpErrorBody { error: self.client_frame() };
        (status, Json(body)).into_response()
    }
}
