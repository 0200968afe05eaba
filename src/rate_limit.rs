/// Rate Limiting System
use crate::{
    config::RateLimitConfig,
    error::{TrustError, TrustResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<DirectLimiter>,
    unauthenticated: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let auth_quota = Quota::per_second(non_zero(config.authenticated_rps, 50))
            .allow_burst(non_zero(config.burst_size, 20));

        // Login, refresh and registration are the brute-force surface
        let unauth_quota = Quota::per_second(non_zero(config.unauthenticated_rps, 5))
            .allow_burst(non_zero(config.burst_size / 4, 5));

        Self {
            enabled: config.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
        }
    }

    /// Check rate limit for authenticated user
    pub fn check_authenticated(&self) -> TrustResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.authenticated.check().map_err(|_| exceeded())
    }

    /// Check rate limit for unauthenticated user
    pub fn check_unauthenticated(&self) -> TrustResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.unauthenticated.check().map_err(|_| exceeded())
    }
}

fn non_zero(value: u32, fallback: u32) -> NonZeroU32 {
    NonZeroU32::new(value)
        .or_else(|| NonZeroU32::new(fallback))
        .unwrap_or(NonZeroU32::MIN)
}

fn exceeded() -> TrustError {
    TrustError::RateLimited {
        message: "Too many requests".to_string(),
        retry_after_secs: Some(1),
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, TrustError> {
    let has_auth_header = request.headers().get("authorization").is_some();

    let result = if has_auth_header {
        ctx.rate_limiter.check_authenticated()
    } else {
        ctx.rate_limiter.check_unauthenticated()
    };

    if let Err(e) = result {
        tracing::warn!(
            path = %request.uri().path(),
            authenticated = has_auth_header,
            "Rate limit exceeded"
        );
        return Err(e);
    }

    Ok(next.run(request).await)
}
