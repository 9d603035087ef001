// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity extraction for the downstream WS route.
//!
//! Real authentication (session cookies, JWT validation, whatever the
//! product's auth layer looks like) is explicitly out of scope (`spec.md`
//! §1, §5): this module is the trusted boundary the real auth layer would
//! sit in front of, reading the caller identity it already established.

use axum::http::HeaderMap;

use crate::error::GatewayError;

const USER_ID_HEADER: &str = "x-user-id";

/// Read the caller's `user_id` out of the trusted `X-User-Id` header, set
/// by whatever sits in front of this gateway in a real deployment.
pub fn extract_user_id(headers: &HeaderMap) -> Result<String, GatewayError> {
    let value = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(GatewayError::InvalidSessionKey)?;
    Ok(value.to_owned())
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
