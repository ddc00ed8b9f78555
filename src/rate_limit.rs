//! Per-client fixed-window rate limiting for the submission endpoint.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{Extensions, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::config::RateLimitConfig;

pub const RATE_LIMITED_MESSAGE: &str = "Too many requests from this IP, please try again later.";

/// Expired windows are swept once the table grows past this many clients.
const SWEEP_THRESHOLD: usize = 10_000;

/// Client address as seen by the one trusted proxy in front: the last
/// `X-Forwarded-For` hop (earlier hops are client-controlled), else the
/// socket peer address.
pub fn client_addr(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Result of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Counts requests per key in fixed windows.
#[derive(Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Count a request for `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() > SWEEP_THRESHOLD {
            let window = self.window;
            clients.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = clients.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            let elapsed = now.duration_since(entry.started);
            return Decision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }
        entry.count += 1;
        Decision::Allowed {
            remaining: self.max_requests - entry.count,
        }
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }
}

/// Axum middleware enforcing the limiter on every request it wraps.
pub async fn rate_limit(State(limiter): State<RateLimiter>, req: Request, next: Next) -> Response {
    let key = client_addr(req.headers(), req.extensions()).unwrap_or_default();

    match limiter.check(&key) {
        Decision::Allowed { remaining } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limiter.max_requests()));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        Decision::Limited { retry_after } => {
            warn!(client = %key, "Rate limit exceeded");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({"error": RATE_LIMITED_MESSAGE})),
            )
                .into_response();
            let secs = retry_after.as_secs().max(1);
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from(secs));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, secs: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests: max,
            window: Duration::from_secs(secs),
        })
    }

    #[test]
    fn allows_up_to_max_then_limits() {
        let rl = limiter(6, 60);
        let now = Instant::now();
        for expected in (0..6).rev() {
            assert_eq!(rl.check_at("1.2.3.4", now), Decision::Allowed { remaining: expected });
        }
        assert!(matches!(rl.check_at("1.2.3.4", now), Decision::Limited { .. }));
    }

    #[test]
    fn clients_are_counted_separately() {
        let rl = limiter(1, 60);
        let now = Instant::now();
        assert!(matches!(rl.check_at("a", now), Decision::Allowed { .. }));
        assert!(matches!(rl.check_at("b", now), Decision::Allowed { .. }));
        assert!(matches!(rl.check_at("a", now), Decision::Limited { .. }));
    }

    #[test]
    fn window_resets() {
        let rl = limiter(1, 60);
        let start = Instant::now();
        rl.check_at("a", start);
        assert!(matches!(
            rl.check_at("a", start + Duration::from_secs(30)),
            Decision::Limited { retry_after } if retry_after == Duration::from_secs(30)
        ));
        assert!(matches!(
            rl.check_at("a", start + Duration::from_secs(61)),
            Decision::Allowed { remaining: 0 }
        ));
    }

    #[test]
    fn spoofed_leading_hops_share_one_window() {
        let rl = limiter(6, 60);
        let now = Instant::now();
        let mut decisions = Vec::new();
        for i in 0..10 {
            let mut headers = HeaderMap::new();
            let value = format!("10.0.0.{i}, 198.51.100.1");
            headers.insert("x-forwarded-for", HeaderValue::from_str(&value).unwrap());
            let key = client_addr(&headers, &Extensions::new()).unwrap();
            decisions.push(rl.check_at(&key, now));
        }
        let allowed = decisions
            .iter()
            .filter(|d| matches!(d, Decision::Allowed { .. }))
            .count();
        assert_eq!(allowed, 6);
    }

    #[test]
    fn proxy_appended_hop_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 203.0.113.9"));
        let mut ext = Extensions::new();
        ext.insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));

        assert_eq!(client_addr(&headers, &ext).as_deref(), Some("203.0.113.9"));

        let mut single = HeaderMap::new();
        single.insert("x-forwarded-for", HeaderValue::from_static(" 198.51.100.4 "));
        assert_eq!(client_addr(&single, &ext).as_deref(), Some("198.51.100.4"));
        assert_eq!(client_addr(&HeaderMap::new(), &ext).as_deref(), Some("127.0.0.1"));
        assert_eq!(client_addr(&HeaderMap::new(), &Extensions::new()), None);
    }
}
