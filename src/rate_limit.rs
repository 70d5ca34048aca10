/// Request rate limiting for the dashboard API
use crate::{
    config::RateLimitConfig,
    error::{DashboardError, DashboardResult},
};
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    session: Arc<DirectLimiter>,
    token: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);

        let session_quota = Quota::per_second(rps).allow_burst(burst);

        // The token routes are fetched by game servers, not people
        let token_quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second / 5).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size / 5).unwrap_or(NonZeroU32::MIN));

        Self {
            enabled: config.enabled,
            session: Arc::new(GovernorLimiter::direct(session_quota)),
            token: Arc::new(GovernorLimiter::direct(token_quota)),
        }
    }

    fn check(limiter: &DirectLimiter) -> DashboardResult<()> {
        limiter.check().map_err(|_| DashboardError::RateLimitExceeded {
            retry_after: Duration::from_secs(1),
        })
    }

    /// Check rate limit for session-authenticated routes
    pub fn check_session(&self) -> DashboardResult<()> {
        if !self.enabled {
            return Ok(());
        }
        Self::check(&self.session)
    }

    /// Check rate limit for the token-gated whitelist and banlist
    pub fn check_token(&self) -> DashboardResult<()> {
        if !self.enabled {
            return Ok(());
        }
        Self::check(&self.token)
    }
}

/// Token routes are the only unauthenticated lists; every management route under
/// the same prefixes is a POST
fn is_token_route(method: &Method, path: &str) -> bool {
    let mut segments = path.trim_start_matches('/').split('/');
    *method == Method::GET
        && matches!(
            (segments.next(), segments.next(), segments.next()),
            (Some("whitelist") | Some("banlist"), Some(token), None) if !token.is_empty()
        )
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Response {
    let result = if is_token_route(request.method(), request.uri().path()) {
        ctx.rate_limiter.check_token()
    } else {
        ctx.rate_limiter.check_session()
    };

    match result {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool, rps: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled,
            requests_per_second: rps,
            burst_size: burst,
        }
    }

    #[test]
    fn test_burst_limit() {
        let limiter = RateLimiter::new(&config(true, 10, 5));

        for _ in 0..5 {
            assert!(limiter.check_session().is_ok());
        }
        assert!(matches!(
            limiter.check_session(),
            Err(DashboardError::RateLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_disabled_never_limits() {
        let limiter = RateLimiter::new(&config(false, 1, 1));
        for _ in 0..20 {
            assert!(limiter.check_session().is_ok());
            assert!(limiter.check_token().is_ok());
        }
    }

    #[test]
    fn test_token_route_detection() {
        assert!(is_token_route(&Method::GET, "/whitelist/abc123"));
        assert!(is_token_route(&Method::GET, "/banlist/abc123"));
        assert!(!is_token_route(&Method::POST, "/whitelist/import"));
        assert!(!is_token_route(&Method::POST, "/whitelist/addGroup"));
        assert!(!is_token_route(&Method::POST, "/whitelist/roles/addPermission"));
        assert!(!is_token_route(&Method::GET, "/getNextMap"));
    }
}
