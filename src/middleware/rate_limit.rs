//! Fixed-window admission control
//!
//! Gates the authentication and payment-creation endpoints. Counters are
//! process-local behind the `RateLimitStore` trait so a shared-cache store
//! can be substituted without touching call sites; a full-limit burst at
//! each window boundary is an accepted property of the fixed-window
//! algorithm.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::error::{AppError, AppResult};

/// Storage behind the limiter: get/increment with a TTL-style window.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Record one request against `key`. Returns whether it is admitted and
    /// the time remaining until the window resets.
    async fn fixed_window_check(
        &self,
        key: &str,
        max_requests: u64,
        window: Duration,
    ) -> (bool, Duration);

    /// Drop all state for a key
    async fn reset(&self, key: &str);
}

/// Window state for a key
#[derive(Debug, Clone)]
struct WindowState {
    count: u64,
    window_start: Instant,
}

/// In-memory fixed-window store.
///
/// Counters do not survive a restart and are not shared across instances.
pub struct MemoryStore {
    windows: DashMap<String, WindowState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        debug!("Creating in-memory rate limit store");
        Self {
            windows: DashMap::new(),
        }
    }

    /// Number of tracked keys (for monitoring)
    pub fn key_count(&self) -> usize {
        self.windows.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn fixed_window_check(
        &self,
        key: &str,
        max_requests: u64,
        window: Duration,
    ) -> (bool, Duration) {
        let now = Instant::now();

        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowState {
                count: 0,
                window_start: now,
            });

        let elapsed = now.duration_since(entry.window_start);
        if elapsed >= window {
            entry.count = 0;
            entry.window_start = now;
        }

        let reset_in = window.saturating_sub(now.duration_since(entry.window_start));
        if entry.count < max_requests {
            entry.count += 1;
            trace!(key = %key, count = entry.count, "rate limit: admitted");
            (true, reset_in)
        } else {
            trace!(key = %key, "rate limit: rejected");
            (false, reset_in)
        }
    }

    async fn reset(&self, key: &str) {
        self.windows.remove(key);
    }
}

/// Fixed-window rate limiter over a pluggable store.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Admit or reject one request for `action` from `client`.
    ///
    /// Must run before the guarded action has any side effect; a rejection
    /// consumes nothing.
    pub async fn admit(
        &self,
        action: &str,
        client: &str,
        limit: u64,
        window: Duration,
    ) -> AppResult<()> {
        let key = format!("{}:{}", action, client);
        let (allowed, reset_in) = self.store.fixed_window_check(&key, limit, window).await;

        if allowed {
            Ok(())
        } else {
            Err(AppError::rate_limited(
                "Too many requests, please slow down",
                Some(reset_in.as_secs().max(1)),
            ))
        }
    }
}

/// Client identity for the rate-limit key: the first forwarded-for hop, or
/// an "unknown" bucket when the header is absent or unreadable.
pub fn client_key(headers: &axum::http::HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_is_enforced() {
        let limiter = RateLimiter::in_memory();
        let window = Duration::from_secs(60);

        for _ in 0..3 {
            assert!(limiter.admit("checkout", "1.2.3.4", 3, window).await.is_ok());
        }

        let rejected = limiter.admit("checkout", "1.2.3.4", 3, window).await;
        assert!(rejected.is_err());
        assert_eq!(rejected.unwrap_err().status_code(), 429);
    }

    #[tokio::test]
    async fn test_window_reset_starts_a_fresh_count() {
        let store = MemoryStore::new();
        let window = Duration::from_millis(100);

        store.fixed_window_check("k", 2, window).await;
        store.fixed_window_check("k", 2, window).await;
        let (allowed, _) = store.fixed_window_check("k", 2, window).await;
        assert!(!allowed);

        tokio::time::sleep(Duration::from_millis(150)).await;

        // New window: counter restarts at 1
        let (allowed, _) = store.fixed_window_check("k", 2, window).await;
        assert!(allowed);
        let (allowed, _) = store.fixed_window_check("k", 2, window).await;
        assert!(allowed);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::in_memory();
        let window = Duration::from_secs(60);

        assert!(limiter.admit("login", "1.1.1.1", 1, window).await.is_ok());
        assert!(limiter.admit("login", "1.1.1.1", 1, window).await.is_err());

        // Different client, same action
        assert!(limiter.admit("login", "2.2.2.2", 1, window).await.is_ok());
        // Same client, different action
        assert!(limiter.admit("checkout", "1.1.1.1", 1, window).await.is_ok());
    }

    #[test]
    fn test_client_key_takes_first_forwarded_hop() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.7, 10.0.0.1".parse().unwrap(),
        );
        assert_eq!(client_key(&headers), "203.0.113.7");
    }

    #[test]
    fn test_client_key_falls_back_to_unknown() {
        let headers = axum::http::HeaderMap::new();
        assert_eq!(client_key(&headers), "unknown");
    }
}
