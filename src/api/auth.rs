/// Login, token rotation and registration endpoints
use crate::{
    auth::{AuthenticatedPrincipal, RequestMeta},
    context::AppContext,
    credentials::{register_identity, NewIdentity, DEFAULT_ROLE_ID},
    db::identity::Identity,
    error::{TrustError, TrustResult},
    session::{LoginRequest, RefreshTokenRequest, TokenPair},
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/refresh", post(refresh))
        .route("/api/v1/auth/revoke", post(revoke))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/auth/profile", get(profile))
        .route("/api/v1/auth/register", post(register))
}

/// Self-registration request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 7, max = 20))]
    pub phone_number: String,
    #[validate(length(min = 8))]
    pub password: String,
}

/// Identity as shown to its owner
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub role: String,
    pub email_verified: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub phone_verified: bool,
    pub phone_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ProfileResponse {
    fn new(identity: Identity, role: String) -> Self {
        Self {
            id: identity.id,
            first_name: identity.first_name,
            middle_name: identity.middle_name,
            last_name: identity.last_name,
            email: identity.email,
            phone_number: identity.phone_number,
            role,
            email_verified: identity.email_verified,
            email_verified_at: identity.email_verified_at,
            phone_verified: identity.phone_verified,
            phone_verified_at: identity.phone_verified_at,
            created_at: identity.created_at,
        }
    }
}

/// Login endpoint
async fn login(
    State(ctx): State<AppContext>,
    meta: RequestMeta,
    Json(req): Json<LoginRequest>,
) -> TrustResult<Json<TokenPair>> {
    let pair = ctx.token_service.login(&req.email, &req.password, meta).await?;
    Ok(Json(pair))
}

/// Refresh token rotation endpoint
async fn refresh(
    State(ctx): State<AppContext>,
    meta: RequestMeta,
    Json(req): Json<RefreshTokenRequest>,
) -> TrustResult<Json<TokenPair>> {
    let pair = ctx.token_service.refresh(&req.refresh_token, meta).await?;
    Ok(Json(pair))
}

/// Revoke a refresh token; revoking twice is not an error
async fn revoke(
    State(ctx): State<AppContext>,
    Json(req): Json<RefreshTokenRequest>,
) -> TrustResult<Json<serde_json::Value>> {
    let revoked = ctx.token_service.revoke(&req.refresh_token).await?;
    Ok(Json(serde_json::json!({ "revoked": revoked })))
}

/// Close the principal's open login session
async fn logout(
    State(ctx): State<AppContext>,
    principal: AuthenticatedPrincipal,
) -> TrustResult<Json<serde_json::Value>> {
    let closed = ctx.token_service.logout(&principal).await?;
    Ok(Json(serde_json::json!({ "success": true, "sessionClosed": closed })))
}

/// Current identity
async fn profile(
    State(ctx): State<AppContext>,
    principal: AuthenticatedPrincipal,
) -> TrustResult<Json<ProfileResponse>> {
    let identity = ctx
        .credentials
        .find_by_id(&principal.user_id)
        .await?
        .ok_or_else(|| TrustError::NotFound("User not found".to_string()))?;

    Ok(Json(ProfileResponse::new(identity, principal.role.as_str().to_string())))
}

/// Register a new user identity
async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> TrustResult<(StatusCode, Json<ProfileResponse>)> {
    req.validate()
        .map_err(|e| TrustError::Validation(e.to_string()))?;

    let identity = register_identity(
        ctx.credentials.as_ref(),
        ctx.hasher.as_ref(),
        NewIdentity {
            first_name: req.first_name.trim().to_string(),
            middle_name: req
                .middle_name
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            last_name: req.last_name.trim().to_string(),
            email: req.email,
            phone_number: req.phone_number,
            password: req.password,
            role_id: DEFAULT_ROLE_ID,
        },
    )
    .await?;

    let role = ctx
        .credentials
        .role_name(identity.role_id)
        .await?
        .unwrap_or_else(|| "User".to_string());

    Ok((StatusCode::CREATED, Json(ProfileResponse::new(identity, role))))
}
