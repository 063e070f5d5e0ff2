use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use crate::error::{Result, StoreError};

/// Actor recorded for edits authorized by the upload secret.
pub const UPLOAD_SECRET_ACTOR: &str = "upload-secret";

/// Constant-time string comparison to prevent timing attacks
/// Use this for comparing upload secrets and other sensitive values
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Resolves the authenticated user behind a request, if any.
///
/// Login itself lives outside this crate; this is the seam it plugs into.
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, headers: &HeaderMap) -> Option<String>;
}

/// Provider for deployments without user login. Only the upload secret works.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentity;

impl IdentityProvider for NoIdentity {
    fn identify(&self, _headers: &HeaderMap) -> Option<String> {
        None
    }
}

/// Trusts a user name set by an authenticating reverse proxy.
///
/// Only safe when the proxy strips this header from client requests.
#[derive(Debug, Clone)]
pub struct TrustedHeaderIdentity {
    header: String,
}

impl TrustedHeaderIdentity {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl IdentityProvider for TrustedHeaderIdentity {
    fn identify(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(self.header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(str::to_string)
    }
}

/// What a caller presented with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: Option<String>,
    pub upload_secret: Option<String>,
}

impl Credentials {
    fn secret_matches(&self, expected: &str) -> bool {
        match &self.upload_secret {
            Some(secret) => !expected.is_empty() && constant_time_compare(secret, expected),
            None => false,
        }
    }
}

/// Authorize an ingestion request: a namespace admin or the upload secret.
///
/// Covers string list changes and translations alike. Returns the actor to
/// record in the log.
pub fn authorize_admin(
    credentials: &Credentials,
    admins: &[&str],
    upload_secret: &str,
) -> Result<String> {
    if let Some(user) = &credentials.user {
        if admins.iter().any(|admin| admin == user) {
            return Ok(user.clone());
        }
    }
    if credentials.secret_matches(upload_secret) {
        return Ok(UPLOAD_SECRET_ACTOR.to_string());
    }
    Err(StoreError::Unauthorized)
}
