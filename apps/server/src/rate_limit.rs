use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

// ── Configuration ──

/// Route groups with separate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Catalog and slot lookups.
    Public,
    /// Authenticated client endpoints.
    Auth,
    /// Appointment creation.
    Booking,
    Admin,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed within the sliding window.
    pub max_requests: u32,
    pub window: Duration,
}

type TierMap = DashMap<Tier, (RateLimitConfig, DashMap<IpAddr, Vec<Instant>>)>;

// ── Core Rate Limiter ──

/// In-memory per-IP sliding-window limiter.
///
/// Tiers without a configuration are not limited.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    tiers: Arc<TierMap>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(tiers: &[(Tier, RateLimitConfig)]) -> Self {
        let limiter = Self::new();
        for (tier, config) in tiers {
            limiter.add_tier(*tier, config.clone());
        }
        limiter
    }

    pub fn add_tier(&self, tier: Tier, config: RateLimitConfig) {
        self.tiers.insert(tier, (config, DashMap::new()));
    }

    /// `Ok(())` if allowed, `Err(retry_after_secs)` if limited.
    pub fn check(&self, tier: Tier, ip: IpAddr) -> Result<(), u64> {
        let Some(tier_entry) = self.tiers.get(&tier) else {
            return Ok(());
        };
        let (config, ip_map) = tier_entry.value();
        let now = Instant::now();

        let mut entry = ip_map.entry(ip).or_default();
        entry.retain(|t| now.duration_since(*t) < config.window);

        if entry.len() >= config.max_requests as usize {
            // Time until the oldest request leaves the window
            let oldest = entry[0];
            let retry_after = (oldest + config.window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        entry.push(now);
        Ok(())
    }

    /// Remove entries older than 2× window from all tiers.
    pub fn cleanup(&self) {
        let now = Instant::now();
        for tier_entry in self.tiers.iter() {
            let (config, ip_map) = tier_entry.value();
            let cutoff = config.window * 2;
            ip_map.retain(|_ip, timestamps| {
                timestamps.retain(|t| now.duration_since(*t) < cutoff);
                !timestamps.is_empty()
            });
        }
    }
}

// ── IP Extraction ──

/// Client IP from X-Forwarded-For (reverse proxy) or the socket address.
pub fn extract_client_ip(req: &Request) -> IpAddr {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

// ── Middleware ──

fn too_many_requests(retry_after: u64) -> Response {
    let body = ApiResponse::<()>::error(format!(
        "Слишком много запросов. Повторите через {} с",
        retry_after
    ));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

/// Middleware for `from_fn_with_state((limiter, tier), rate_limit)`.
pub async fn rate_limit(
    State((limiter, tier)): State<(RateLimiter, Tier)>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check(tier, ip).map_err(|retry_after| {
        tracing::warn!(?tier, %ip, retry_after, "rate limited");
        too_many_requests(retry_after)
    })?;
    Ok(next.run(req).await)
}

// ── Tests ──
