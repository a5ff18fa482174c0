//! Player token authentication and HTTP Basic auth for admin routes

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

use crate::error::GameError;
use crate::state::AppState;
use crate::types::Player;

/// Constant-time byte comparison to prevent timing attacks
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Token from `Authorization: Token <t>` or `Authorization: Bearer <t>`
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    (scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer")).then_some(token)
}

/// The authenticated player behind a request
pub struct AuthPlayer(pub Player);

impl FromRequestParts<Arc<AppState>> for AuthPlayer {
    type Rejection = GameError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(GameError::Unauthenticated)?;
        state
            .get_player_by_token(token)
            .await
            .map(AuthPlayer)
            .ok_or(GameError::Unauthenticated)
    }
}

/// Like [`AuthPlayer`], but anonymous requests are let through.
///
/// A token that is present but unknown is still rejected.
pub struct MaybePlayer(pub Option<Player>);

impl FromRequestParts<Arc<AppState>> for MaybePlayer {
    type Rejection = GameError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(header::AUTHORIZATION) {
            return Ok(MaybePlayer(None));
        }
        let AuthPlayer(player) = AuthPlayer::from_request_parts(parts, state).await?;
        Ok(MaybePlayer(Some(player)))
    }
}

/// Credentials for the state export/import routes
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Username (None = admin routes refused)
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AdminConfig {
    /// ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable admin routes
    pub fn from_env() -> Self {
        let username = std::env::var("ADMIN_USERNAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if username.is_some() && password.is_some() {
            tracing::info!("Admin authentication enabled");
            Self { username, password }
        } else {
            if username.is_some() || password.is_some() {
                tracing::warn!(
                    "ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable admin routes"
                );
            }
            tracing::warn!("Admin routes disabled, state export/import will be refused");
            Self {
                username: None,
                password: None,
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    pub fn validate(&self, username: &str, password: &str) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                constant_time_eq(u.as_bytes(), username.as_bytes())
                    && constant_time_eq(p.as_bytes(), password.as_bytes())
            }
            _ => false,
        }
    }
}

fn basic_credentials(request: &Request<Body>) -> Option<(String, String)> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Middleware for HTTP Basic Authentication on admin routes
pub async fn admin_auth_middleware(
    State(config): State<Arc<AdminConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !config.is_enabled() {
        return (StatusCode::FORBIDDEN, "Admin access is not configured").into_response();
    }

    if let Some((username, password)) = basic_credentials(&request) {
        if config.validate(&username, &password) {
            return next.run(request).await;
        }
        tracing::warn!("Rejected admin credentials for user {}", username);
    }

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"Articulate Admin\"")],
        "Unauthorized",
    )
        .into_response()
}
