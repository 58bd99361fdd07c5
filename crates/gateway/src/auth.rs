use std::sync::Arc;

use {
    axum::{
        extract::{Request, State},
        http::header::AUTHORIZATION,
        middleware::Next,
        response::{IntoResponse, Response},
    },
    secrecy::{ExposeSecret, Secret},
    tracing::debug,
};

use crate::{error::GatewayError, state::GatewayState};

// ── Types ────────────────────────────────────────────────────────────────────

/// Resolved gateway auth configuration.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAuth {
    /// Bearer token required on protected routes. `None` disables auth.
    pub token: Option<Secret<String>>,
}

impl ResolvedAuth {
    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Check an `Authorization` header value against the configured token.
    pub fn authorize(&self, header: Option<&str>) -> AuthResult {
        let Some(expected) = self.token.as_ref() else {
            return AuthResult::Disabled;
        };
        let Some(given) = header.and_then(bearer_token) else {
            return AuthResult::Missing;
        };
        if safe_equal(given, expected.expose_secret()) {
            AuthResult::Ok
        } else {
            AuthResult::Mismatch
        }
    }
}

/// Outcome of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    /// No token configured, every request passes.
    Disabled,
    Ok,
    Missing,
    Mismatch,
}

impl AuthResult {
    pub fn allowed(self) -> bool {
        matches!(self, Self::Disabled | Self::Ok)
    }

    fn reason(self) -> &'static str {
        match self {
            Self::Disabled | Self::Ok => "ok",
            Self::Missing => "token_missing",
            Self::Mismatch => "token_mismatch",
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    // XOR each byte and accumulate; any difference makes result non-zero.
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

// ── Auth logic ───────────────────────────────────────────────────────────────

/// Resolve auth from the environment value (wins) and the config value.
pub fn resolve_auth(env_token: Option<String>, config_token: Option<Secret<String>>) -> ResolvedAuth {
    let token = env_token
        .filter(|t| !t.trim().is_empty())
        .map(Secret::new)
        .or(config_token.filter(|t| !t.expose_secret().trim().is_empty()));
    ResolvedAuth { token }
}

/// Middleware rejecting requests without the configured bearer token.
pub async fn require_token(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let result = state.auth.authorize(header);
    if !result.allowed() {
        debug!(path = %request.uri().path(), reason = result.reason(), "rejected request");
        return GatewayError::Unauthorized.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_token(token: &str) -> ResolvedAuth {
        resolve_auth(Some(token.into()), None)
    }

    #[test]
    fn disabled_without_token() {
        let auth = resolve_auth(None, None);
        assert!(!auth.is_enabled());
        assert_eq!(auth.authorize(None), AuthResult::Disabled);
    }

    #[test]
    fn env_token_wins_over_config() {
        let auth = resolve_auth(Some("from-env".into()), Some(Secret::new("from-config".into())));
        assert_eq!(auth.authorize(Some("Bearer from-env")), AuthResult::Ok);
        assert_eq!(auth.authorize(Some("Bearer from-config")), AuthResult::Mismatch);

        let auth = resolve_auth(Some("  ".into()), Some(Secret::new("from-config".into())));
        assert_eq!(auth.authorize(Some("Bearer from-config")), AuthResult::Ok);
    }

    #[test]
    fn bearer_parsing() {
        let auth = with_token("s3cret");
        assert_eq!(auth.authorize(Some("bearer s3cret")), AuthResult::Ok);
        assert_eq!(auth.authorize(Some("Bearer  s3cret ")), AuthResult::Ok);
        assert_eq!(auth.authorize(Some("Basic s3cret")), AuthResult::Missing);
        assert_eq!(auth.authorize(Some("Bearer")), AuthResult::Missing);
        assert_eq!(auth.authorize(None), AuthResult::Missing);
        assert_eq!(auth.authorize(Some("Bearer s3cre")), AuthResult::Mismatch);
    }

    #[test]
    fn safe_equal_compares_contents() {
        assert!(safe_equal("abc", "abc"));
        assert!(!safe_equal("abc", "abd"));
        assert!(!safe_equal("abc", "abcd"));
    }
}
