//! Rate limiting for the generation routes.
//!
//! Every chat turn costs a model call, so turns are limited per player
//! token. Anonymous demo requests share one bucket.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

const ANONYMOUS_KEY: &str = "anonymous";

/// Fixed-window rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Map of key to (request count, window start)
    requests: Arc<RwLock<HashMap<String, (u32, Instant)>>>,
    max_requests: u32,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(20, Duration::from_secs(60)) // 20 turns per minute
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if allowed, false if rate limited
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        match requests.get_mut(key) {
            Some((count, window_start)) => {
                if now.duration_since(*window_start) >= self.window {
                    *count = 1;
                    *window_start = now;
                    true
                } else if *count >= self.max_requests {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                requests.insert(key.to_string(), (1, now));
                true
            }
        }
    }

    /// Clean up old entries (call periodically)
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, (_, window_start)| now.duration_since(*window_start) < self.window * 2);
    }

    pub async fn tracked_keys(&self) -> usize {
        self.requests.read().await.len()
    }
}

/// Spawn a task that drops expired windows
pub fn spawn_cleanup(limiter: RateLimiter) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(limiter.window().max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    })
}

#[derive(Debug, Clone)]
pub struct AbuseConfig {
    /// Rate limiter (None = disabled)
    pub rate_limiter: Option<RateLimiter>,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            rate_limiter: Some(RateLimiter::default()),
        }
    }
}

impl AbuseConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let rate_limit_enabled = std::env::var("ABUSE_RATE_LIMIT")
            .map(|v| v.trim() != "0" && !v.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        let rate_limiter = if rate_limit_enabled {
            let max_requests = std::env::var("ABUSE_RATE_LIMIT_MAX")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(20);

            let window_secs = std::env::var("ABUSE_RATE_LIMIT_WINDOW")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(60);

            tracing::info!(max_requests, window_secs, "Turn rate limiting enabled");
            Some(RateLimiter::new(
                max_requests,
                Duration::from_secs(window_secs),
            ))
        } else {
            tracing::warn!("Turn rate limiting DISABLED");
            None
        };

        Self { rate_limiter }
    }

    pub fn disabled() -> Self {
        Self { rate_limiter: None }
    }
}

/// Rate limit key: the player token, or the shared anonymous bucket
fn rate_limit_key(request: &Request<Body>) -> String {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().split_once(' '))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .map(|token| format!("token:{}", token))
        .unwrap_or_else(|| ANONYMOUS_KEY.to_string())
}

fn rate_limited(window: Duration) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, window.as_secs().max(1).to_string())],
        "Rate limit exceeded. Please slow down.",
    )
        .into_response()
}

/// Middleware limiting generation requests per player
pub async fn turn_rate_limit_middleware(
    State(config): State<Arc<AbuseConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(ref rate_limiter) = config.rate_limiter {
        let key = rate_limit_key(&request);
        if !rate_limiter.check(&key).await {
            tracing::warn!(key, "Rate limited");
            return rate_limited(rate_limiter.window());
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_allows_normal_traffic() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));

        for _ in 0..5 {
            assert!(limiter.check("test-key").await);
        }
        assert!(!limiter.check("test-key").await);
    }

    #[tokio::test]
    async fn test_rate_limiter_different_keys() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));

        assert!(limiter.check("key1").await);
        assert!(limiter.check("key1").await);
        assert!(!limiter.check("key1").await);

        assert!(limiter.check("key2").await);
        assert!(limiter.check("key2").await);
        assert!(!limiter.check("key2").await);
    }

    #[tokio::test]
    async fn test_rate_limiter_window_reset() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));

        assert!(limiter.check("key").await);
        assert!(limiter.check("key").await);
        assert!(!limiter.check("key").await);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.check("key").await);
    }

    #[tokio::test]
    async fn test_cleanup_drops_expired_windows() {
        let limiter = RateLimiter::new(2, Duration::from_millis(10));
        limiter.check("key").await;
        assert_eq!(limiter.tracked_keys().await, 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_keys().await, 0);
    }

    #[test]
    fn test_rate_limit_key() {
        let request = Request::builder()
            .header(header::AUTHORIZATION, "Token abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(rate_limit_key(&request), "token:abc");

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(rate_limit_key(&request), ANONYMOUS_KEY);
    }

    #[test]
    fn test_rate_limited_response() {
        let response = rate_limited(Duration::from_secs(60));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    }
}
