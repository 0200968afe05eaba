/// Authenticated principal, request metadata and their extractors
///
/// The bearer access token is resolved into an [`AuthenticatedPrincipal`]
/// once, at the HTTP boundary. Core services receive the principal as a plain
/// value and never look at tokens themselves.
use crate::{
    api::middleware::extract_bearer_token,
    context::AppContext,
    error::{TrustError, TrustResult},
};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use axum_extra::headers::{HeaderMapExt, UserAgent};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Role names known to the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleName {
    Admin,
    User,
    Ambulance,
}

impl RoleName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Admin => "Admin",
            RoleName::User => "User",
            RoleName::Ambulance => "Ambulance",
        }
    }

    pub fn parse(s: &str) -> TrustResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(RoleName::Admin),
            "user" => Ok(RoleName::User),
            "ambulance" => Ok(RoleName::Ambulance),
            _ => Err(TrustError::Validation(format!("Invalid role: {}", s))),
        }
    }
}

/// Caller identity resolved from a verified access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedPrincipal {
    pub user_id: String,
    pub email: String,
    pub role: RoleName,
}

impl AuthenticatedPrincipal {
    pub fn is_admin(&self) -> bool {
        self.role == RoleName::Admin
    }

    pub fn require_admin(&self) -> TrustResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(TrustError::Forbidden("Admin role required".to_string()))
        }
    }
}

/// Client address and user agent recorded alongside audited actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: Some(ip_address.into()),
            user_agent: Some(user_agent.into()),
        }
    }

    pub fn ip_or_unknown(&self) -> &str {
        self.ip_address.as_deref().unwrap_or("Unknown")
    }

    pub fn user_agent_or_empty(&self) -> &str {
        self.user_agent.as_deref().unwrap_or("")
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = TrustError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // First hop of X-Forwarded-For wins over the socket address
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let ip_address = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        let user_agent = parts
            .headers
            .typed_get::<UserAgent>()
            .map(|ua| ua.as_str().to_string());

        Ok(RequestMeta {
            ip_address,
            user_agent,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthenticatedPrincipal {
    type Rejection = TrustError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| TrustError::Unauthenticated("Missing authorization header".to_string()))?;

        state.token_service.validate_access_token(&token)
    }
}

/// Principal that has already been checked for the admin role
#[derive(Debug, Clone)]
pub struct AdminPrincipal(pub AuthenticatedPrincipal);

#[async_trait]
impl FromRequestParts<AppContext> for AdminPrincipal {
    type Rejection = TrustError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let principal = AuthenticatedPrincipal::from_request_parts(parts, state).await?;

        if let Err(e) = principal.require_admin() {
            tracing::warn!(user_id = %principal.user_id, "non-admin attempted admin operation");
            return Err(e);
        }

        Ok(AdminPrincipal(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_role_parse() {
        assert_eq!(RoleName::parse("Admin").unwrap(), RoleName::Admin);
        assert_eq!(RoleName::parse("ambulance").unwrap(), RoleName::Ambulance);
        assert!(RoleName::parse("root").is_err());
    }

    #[test]
    fn test_require_admin() {
        let mut principal = AuthenticatedPrincipal {
            user_id: "u1".to_string(),
            email: "u1@example.ph".to_string(),
            role: RoleName::User,
        };
        assert!(matches!(principal.require_admin(), Err(TrustError::Forbidden(_))));

        principal.role = RoleName::Admin;
        assert!(principal.require_admin().is_ok());
    }

    #[tokio::test]
    async fn test_request_meta_prefers_forwarded_for() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("user-agent", "siglat-mobile/2.1")
            .body(())
            .unwrap();
        let (mut parts, _) = req.into_parts();

        let meta = RequestMeta::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(meta.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(meta.user_agent.as_deref(), Some("siglat-mobile/2.1"));
    }

    #[tokio::test]
    async fn test_request_meta_without_headers() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let meta = RequestMeta::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(meta.ip_or_unknown(), "Unknown");
        assert_eq!(meta.user_agent_or_empty(), "");
    }
}
