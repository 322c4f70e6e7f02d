//! # Bearer Token Authentication
//!
//! Optional static-token auth for the API surface. When `IMPANO_AUTH_TOKEN`
//! is set, every `/v1/*` request must carry `Authorization: Bearer <token>`;
//! when unset, the middleware passes everything through (development mode).
//!
//! Tokens are compared by SHA-256 digest rather than raw bytes: the digests
//! are fixed-length, so the comparison cannot leak the secret's length, and
//! an early-exit byte mismatch reveals nothing about the token itself.

use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// A secret token that never appears in `Debug` output or logs.
#[derive(Clone)]
pub struct SecretString {
    digest: [u8; 32],
}

impl SecretString {
    /// Wrap a secret. Only the SHA-256 digest is retained.
    pub fn new(secret: &str) -> Self {
        Self {
            digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    /// Whether `candidate` matches the wrapped secret.
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        // Fixed-length digest comparison; no data-dependent early exit on
        // secret material.
        let mut diff = 0u8;
        for (a, b) in self.digest.iter().zip(candidate.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString(<redacted>)")
    }
}

/// Auth middleware configuration, injected as an axum `Extension`.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Expected token. `None` disables authentication.
    pub token: Option<SecretString>,
}

/// Extract the bearer token from the `Authorization` header.
fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Middleware enforcing bearer-token authentication when configured.
pub async fn auth_middleware(request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let Some(expected) = expected else {
        return next.run(request).await;
    };

    match bearer_token(&request) {
        Some(provided) if expected.matches(provided) => next.run(request).await,
        Some(_) => AppError::Unauthorized("invalid bearer token".to_string()).into_response(),
        None => {
            AppError::Unauthorized("missing Authorization: Bearer header".to_string())
                .into_response()
        }
    }
}
