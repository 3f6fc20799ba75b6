//! Admin Authentication
//!
//! Admin routes require the `X-Auth-Token` header to match the configured
//! token. Comparison is constant-time over the supplied bytes so timing
//! does not leak prefix matches.

use axum::http::HeaderMap;

use super::error::ApiError;
use crate::config::Config;

pub const AUTH_HEADER: &str = "x-auth-token";

/// Constant-time byte comparison: XOR-fold over the full length of both
/// inputs, with the length difference folded in.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut diff = (a.len() ^ b.len()) as u8;
    let longest = a.len().max(b.len());
    for i in 0..longest {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= x ^ y;
    }
    diff == 0
}

/// Gate an admin route. Fails closed when no token is configured.
pub fn require_admin(headers: &HeaderMap, config: &Config) -> Result<(), ApiError> {
    let Some(expected) = config.admin_token.as_deref() else {
        return Err(ApiError::invalid_input("admin token not configured"));
    };
    let supplied = headers
        .get(AUTH_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if constant_time_eq(supplied.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(ApiError::invalid_input("invalid admin token"))
    }
}
