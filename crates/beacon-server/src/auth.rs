//! Bearer-token authorization for write endpoints.
//!
//! The sync core only consumes a yes/no answer: the caller either presents
//! the configured bearer token or the request is rejected with 401.
//! Everything else (sessions, password checks, 2FA) lives outside this
//! service. Comparison is constant-time.

use axum::http::{HeaderMap, header};
use beacon_core::errors::SyncError;
use beacon_store::crypto::constant_time_eq;

/// Extract the bearer token from an `Authorization` header, if present.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Check the caller's bearer token against the configured key.
pub fn authorize(headers: &HeaderMap, api_key: &str) -> Result<(), SyncError> {
    match bearer_token(headers) {
        Some(token) if constant_time_eq(token.as_bytes(), api_key.as_bytes()) => Ok(()),
        _ => Err(SyncError::Unauthorized),
    }
}
