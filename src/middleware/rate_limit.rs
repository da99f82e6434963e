//! Per-IP rate limiting using governor.
//!
//! Two budgets: a general one for every route and a stricter one layered on
//! the `/auth/*` routes.

use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use serde::Serialize;
use std::{net::IpAddr, net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};
use tracing::warn;

pub type KeyedRateLimiter =
    RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub enabled: bool,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(120, 60)
    }
}

impl RateLimitConfig {
    pub fn new(requests_per_window: u32, window_secs: u64) -> Self {
        Self {
            requests_per_window,
            window_secs,
            enabled: true,
            burst_size: requests_per_window / 2,
        }
    }

    /// Budget for login, sign-up and password reset.
    pub fn strict() -> Self {
        Self {
            requests_per_window: 20,
            window_secs: 60,
            enabled: true,
            burst_size: 10,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn create_limiter(&self) -> Option<Arc<KeyedRateLimiter>> {
        if !self.enabled || self.requests_per_window == 0 {
            return None;
        }

        let replenish_ns =
            (self.window_secs as u128 * 1_000_000_000) / self.requests_per_window as u128;
        let quota = Quota::with_period(Duration::from_nanos(replenish_ns.max(1) as u64))?
            .allow_burst(NonZeroU32::new(self.burst_size.max(1))?);

        Some(Arc::new(RateLimiter::dashmap(quota)))
    }
}

#[derive(Clone)]
pub struct RateLimitState {
    pub global_limiter: Option<Arc<KeyedRateLimiter>>,
    pub auth_limiter: Option<Arc<KeyedRateLimiter>>,
    pub config: RateLimitConfig,
}

impl RateLimitState {
    pub fn with_config(global_config: RateLimitConfig, auth_config: RateLimitConfig) -> Self {
        Self {
            global_limiter: global_config.create_limiter(),
            auth_limiter: auth_config.create_limiter(),
            config: global_config,
        }
    }

    pub fn disabled() -> Self {
        Self {
            global_limiter: None,
            auth_limiter: None,
            config: RateLimitConfig::disabled(),
        }
    }
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::with_config(RateLimitConfig::default(), RateLimitConfig::strict())
    }
}

#[derive(Debug, Serialize)]
pub struct RateLimitExceeded {
    pub error: String,
    pub code: &'static str,
    pub retry_after_secs: u64,
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after_secs.to_string();
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(self)).into_response();

        if let Ok(value) = HeaderValue::from_str(&retry_after) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, value.clone());
            response.headers_mut().insert("X-RateLimit-Reset", value);
        }
        response
    }
}

fn client_ip(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
}

async fn enforce(
    limiter: Option<&Arc<KeyedRateLimiter>>,
    config: &RateLimitConfig,
    message: &str,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    let Some(limiter) = limiter else {
        return Ok(next.run(request).await);
    };

    let ip = client_ip(&request);
    match limiter.check_key(&ip) {
        Ok(_) => {
            let mut response = next.run(request).await;
            if let Ok(value) = HeaderValue::from_str(&config.requests_per_window.to_string()) {
                response.headers_mut().insert("X-RateLimit-Limit", value);
            }
            Ok(response)
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1);
            warn!(ip = %ip, retry_after_secs = retry_after, "Rate limit exceeded");

            Err(RateLimitExceeded {
                error: message.to_string(),
                code: "RATE_LIMITED",
                retry_after_secs: retry_after,
            })
        }
    }
}

pub async fn rate_limit_middleware(
    state: Option<Extension<RateLimitState>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    let Some(Extension(state)) = state else {
        return Ok(next.run(request).await);
    };
    enforce(
        state.global_limiter.as_ref(),
        &state.config,
        "Muitas requisições. Tente novamente em instantes.",
        request,
        next,
    )
    .await
}

pub async fn auth_rate_limit_middleware(
    state: Option<Extension<RateLimitState>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    let Some(Extension(state)) = state else {
        return Ok(next.run(request).await);
    };
    enforce(
        state.auth_limiter.as_ref(),
        &state.config,
        "Muitas tentativas de acesso. Aguarde alguns instantes.",
        request,
        next,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_budget() {
        let config = RateLimitConfig::strict();
        assert_eq!(config.requests_per_window, 20);
        assert_eq!(config.burst_size, 10);
        assert!(config.create_limiter().is_some());
    }

    #[test]
    fn test_disabled_has_no_limiter() {
        assert!(RateLimitConfig::disabled().create_limiter().is_none());
        assert!(RateLimitConfig::new(0, 60).create_limiter().is_none());

        let state = RateLimitState::disabled();
        assert!(state.global_limiter.is_none());
        assert!(state.auth_limiter.is_none());
    }

    #[test]
    fn test_exceeded_response_sets_retry_after() {
        let response = RateLimitExceeded {
            error: "x".to_string(),
            code: "RATE_LIMITED",
            retry_after_secs: 7,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "7");
    }

    #[test]
    fn test_budgets_are_per_ip() {
        let limiter = RateLimitConfig {
            requests_per_window: 2,
            window_secs: 60,
            enabled: true,
            burst_size: 2,
        }
        .create_limiter()
        .unwrap();

        let school_lab: IpAddr = "10.0.0.1".parse().unwrap();
        let teacher_home: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check_key(&school_lab).is_ok());
        assert!(limiter.check_key(&school_lab).is_ok());
        assert!(limiter.check_key(&school_lab).is_err());
        assert!(limiter.check_key(&teacher_home).is_ok());
    }
}
